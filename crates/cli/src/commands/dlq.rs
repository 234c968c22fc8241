//! DLQ reprocessing: one pass, or a pass every interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use eventline_events::DemoEventProcessor;
use eventline_infra::DlqReprocessor;
use eventline_infra::reprocessor::{DEFAULT_MAX_RETRIES, DEFAULT_REPROCESS_BATCH};

use crate::{connect, interrupt_signal};

#[derive(Parser, Debug)]
#[command(name = "eventline-dlq", version, about = "Retry dead-lettered events")]
pub struct DlqArgs {
    /// Entries read per batch
    #[arg(long, default_value_t = DEFAULT_REPROCESS_BATCH, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    batch_size: usize,

    /// Entries whose retry count reached this value are skipped
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Keep running, one pass per interval
    #[arg(long)]
    continuous: bool,

    /// Interval between passes in continuous mode (seconds)
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,
}

pub fn handle(args: DlqArgs) -> Result<()> {
    let stop = interrupt_signal()?;
    let (store, pipeline) = connect()?;
    let reprocessor = DlqReprocessor::new(store, Arc::new(DemoEventProcessor), pipeline.dlq_stream);
    let batch_size = args.batch_size;

    if !args.continuous {
        let report = reprocessor.reprocess(batch_size, args.max_retries)?;
        println!(
            "DLQ reprocessing completed: {} processed, {} failed, {} skipped",
            report.processed, report.failed, report.skipped
        );
        return Ok(());
    }

    info!(interval_secs = args.interval, "continuous dlq reprocessing started");
    let interval = Duration::from_secs(args.interval);
    while !stop.is_stopped() {
        if let Err(e) = reprocessor.reprocess(batch_size, args.max_retries) {
            error!(error = %e, "dlq pass aborted, retrying next interval");
        }
        if stop.sleep(interval) {
            break;
        }
    }
    info!("continuous dlq reprocessing stopped");
    Ok(())
}
