//! Infrastructure layer: the Redis log store and the pipeline components
//! that run against any `LogStore`.

pub mod config;
pub mod log_store;
pub mod monitor;
pub mod producer;
pub mod reprocessor;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;


pub use config::{ConfigError, PipelineConfig, RedisConfig};
pub use monitor::{Monitor, PipelineSnapshot};
pub use producer::{DEMO_EVENT_TYPES, ProduceError, Producer};
pub use reprocessor::{DlqReprocessor, ReprocessReport};
pub use workers::{
    Consumer, ConsumerConfig, ConsumerError, ConsumerManager, ConsumerState, ConsumerStats,
    ShutdownReport,
};
