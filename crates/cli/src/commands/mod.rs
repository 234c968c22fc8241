pub mod consumer;
pub mod dlq;
pub mod monitor;
pub mod producer;
