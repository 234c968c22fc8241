//! Configuration loading and representation.
//!
//! Values come from the environment with sensible local defaults; CLI flags
//! layer per-mode options on top.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_STREAM: &str = "events";
pub const DEFAULT_DLQ_STREAM: &str = "dlq";
pub const DEFAULT_GROUP: &str = "event_group";
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BLOCK_MS: u64 = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}` ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the Redis log store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl RedisConfig {
    /// `REDIS_URL`, falling back to the local default.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        }
    }
}

/// Stream, group and consumption settings shared by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub stream_name: String,
    pub dlq_stream: String,
    pub consumer_group: String,
    /// Maximum entries claimed per consumer cycle.
    pub batch_size: usize,
    /// Maximum time a claim blocks waiting for entries.
    pub processing_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM.to_string(),
            dlq_stream: DEFAULT_DLQ_STREAM.to_string(),
            consumer_group: DEFAULT_GROUP.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            processing_timeout: Duration::from_millis(DEFAULT_BLOCK_MS),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `EVENTLINE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("EVENTLINE_STREAM") {
            cfg.stream_name = v;
        }
        if let Some(v) = lookup("EVENTLINE_DLQ_STREAM") {
            cfg.dlq_stream = v;
        }
        if let Some(v) = lookup("EVENTLINE_GROUP") {
            cfg.consumer_group = v;
        }
        if let Some(v) = lookup("EVENTLINE_BATCH_SIZE") {
            cfg.batch_size = parse_positive("EVENTLINE_BATCH_SIZE", &v)? as usize;
        }
        if let Some(v) = lookup("EVENTLINE_BLOCK_MS") {
            cfg.processing_timeout = Duration::from_millis(parse_positive("EVENTLINE_BLOCK_MS", &v)?);
        }

        Ok(cfg)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    match value.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(&e.to_string())),
    }
}
