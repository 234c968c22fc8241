//! Periodic pipeline snapshots on stdout.

use std::time::Duration;

use anyhow::Result;
use tracing::error;

use eventline_infra::{Monitor, PipelineSnapshot};

use crate::{connect, interrupt_signal};

#[derive(clap::Args, Debug)]
pub struct MonitorArgs {
    /// Polling interval (seconds)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,
}

pub fn handle(args: MonitorArgs) -> Result<()> {
    let stop = interrupt_signal()?;
    let (store, pipeline) = connect()?;
    let monitor = Monitor::new(store, pipeline);

    monitor.run(Duration::from_secs(args.interval), &stop, |snapshot| {
        print_snapshot(snapshot, args.json)
    });
    Ok(())
}

fn print_snapshot(snapshot: &PipelineSnapshot, json: bool) {
    if !json {
        println!("{snapshot}");
        return;
    }
    match serde_json::to_string(snapshot) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "failed to encode snapshot"),
    }
}
