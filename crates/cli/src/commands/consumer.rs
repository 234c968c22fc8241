//! Consumer pool: runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use eventline_events::DemoEventProcessor;
use eventline_infra::ConsumerManager;

use crate::{connect, interrupt_signal};

const WAIT_SLICE: Duration = Duration::from_secs(60);

#[derive(clap::Args, Debug)]
pub struct ConsumerArgs {
    /// Number of parallel consumer workers
    #[arg(long, default_value = "1", value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: usize,

    /// Entries claimed per cycle (overrides EVENTLINE_BATCH_SIZE)
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    batch_size: Option<usize>,

    /// Claim block time in milliseconds (overrides EVENTLINE_BLOCK_MS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    block_ms: Option<u64>,

    /// Worker identity prefix; workers are named `<prefix>-<n>`
    #[arg(long, default_value = "consumer")]
    name_prefix: String,
}

pub fn handle(args: ConsumerArgs) -> Result<()> {
    let stop = interrupt_signal()?;
    let (store, mut pipeline) = connect()?;

    if let Some(n) = args.batch_size {
        pipeline = pipeline.with_batch_size(n);
    }
    if let Some(ms) = args.block_ms {
        pipeline = pipeline.with_processing_timeout(Duration::from_millis(ms));
    }

    let mut manager = ConsumerManager::new(store, Arc::new(DemoEventProcessor), pipeline, args.workers)
        .with_name_prefix(args.name_prefix);
    manager.start()?;

    while !stop.sleep(WAIT_SLICE) {}

    let stats = manager.stats();
    let report = manager.stop();
    info!(
        claimed = stats.claimed,
        acknowledged = stats.acknowledged,
        dead_lettered = stats.dead_lettered,
        store_errors = stats.store_errors,
        stopped = report.stopped.len(),
        timed_out = report.timed_out.len(),
        failed = report.failed.len(),
        "consumer pool finished"
    );
    Ok(())
}
