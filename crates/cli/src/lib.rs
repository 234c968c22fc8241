//! Command handlers behind the `eventline` and `eventline-dlq` binaries.

pub mod commands;

use anyhow::Result;
use tracing::info;

use eventline_events::StopSignal;
use eventline_infra::log_store::RedisStreamsLogStore;
use eventline_infra::{PipelineConfig, RedisConfig};

/// Stop signal flipped by Ctrl-C.
pub fn interrupt_signal() -> Result<StopSignal> {
    let stop = StopSignal::new();
    let s = stop.clone();

    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        s.stop();
    })?;

    Ok(stop)
}

/// Store and pipeline settings from the environment.
pub fn connect() -> Result<(RedisStreamsLogStore, PipelineConfig)> {
    let redis = RedisConfig::from_env();
    let pipeline = PipelineConfig::from_env()?;
    let store = RedisStreamsLogStore::new(&redis.url)?;

    info!(
        redis_url = %redis.url,
        stream = %pipeline.stream_name,
        dlq = %pipeline.dlq_stream,
        group = %pipeline.consumer_group,
        "pipeline configured"
    );
    Ok((store, pipeline))
}
