//! Infrastructure log store implementations.
//!
//! The `LogStore` boundary lives in `eventline-events` as pure mechanics.
//! This module provides infrastructure-backed implementations (Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsLogStore;
