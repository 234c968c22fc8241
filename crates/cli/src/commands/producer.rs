//! Demo producer loop.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use eventline_infra::Producer;

use crate::{connect, interrupt_signal};

#[derive(clap::Args, Debug)]
pub struct ProducerArgs {
    /// Delay between events (milliseconds)
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Stop after this many events
    #[arg(long)]
    count: Option<u64>,
}

pub fn handle(args: ProducerArgs) -> Result<()> {
    let stop = interrupt_signal()?;
    let (store, pipeline) = connect()?;
    let producer = Producer::new(store, pipeline.stream_name);
    let interval = Duration::from_millis(args.interval_ms);

    info!(interval_ms = args.interval_ms, count = ?args.count, "producer started");

    let mut produced = 0u64;
    while !stop.is_stopped() && args.count.is_none_or(|n| produced < n) {
        let event = producer.next_demo_event();
        match producer.produce(&event) {
            Ok(_) => produced += 1,
            Err(e) => warn!(event_id = event.id, error = %e, "produce failed, continuing"),
        }
        if stop.sleep(interval) {
            break;
        }
    }

    info!(produced, "producer stopped");
    Ok(())
}
