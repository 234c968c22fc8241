//! Consumer workers and their supervisor.
//!
//! ## Components
//!
//! - `Consumer`: one identity in a consumer group, claims and routes entries
//! - `ConsumerManager`: runs N consumers on their own threads with shared
//!   stop signalling

pub mod consumer;
pub mod manager;

pub use consumer::{
    Consumer, ConsumerConfig, ConsumerError, ConsumerState, ConsumerStats, EntryOutcome,
};
pub use manager::{ConsumerManager, ShutdownReport};
