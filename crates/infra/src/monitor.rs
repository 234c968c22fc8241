//! Read-only pipeline monitor.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use eventline_events::{GroupInfo, LogStore, PendingEntry, StopSignal, StoreError};

use crate::config::PipelineConfig;

/// Pending records fetched per snapshot.
pub const PENDING_DETAIL_LIMIT: usize = 50;
/// Pending records shown by the text rendering.
pub const PENDING_DISPLAY_LIMIT: usize = 5;

const RULE: &str = "==================================================";

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub stream_name: String,
    pub dlq_stream: String,
    pub consumer_group: String,
    pub main_stream_length: u64,
    pub dlq_stream_length: u64,
    /// `None` when the group has not been created yet.
    pub group: Option<GroupInfo>,
    pub pending: Vec<PendingEntry>,
    pub captured_at: DateTime<Utc>,
}

impl fmt::Display for PipelineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (consumers, pending) = self
            .group
            .as_ref()
            .map_or((0, 0), |g| (g.consumers, g.pending));

        writeln!(f, "{RULE}")?;
        writeln!(f, "EVENT PIPELINE MONITOR")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Main Stream ({}): {} messages", self.stream_name, self.main_stream_length)?;
        writeln!(f, "DLQ Stream ({}): {} messages", self.dlq_stream, self.dlq_stream_length)?;
        writeln!(f, "Consumer Group: {}", self.consumer_group)?;
        writeln!(f, "Consumers: {consumers}")?;
        writeln!(f, "Pending Messages: {pending}")?;

        if !self.pending.is_empty() {
            writeln!(f)?;
            writeln!(f, "Pending Messages Details:")?;
            for (i, p) in self.pending.iter().take(PENDING_DISPLAY_LIMIT).enumerate() {
                writeln!(
                    f,
                    "  {}. ID: {}, Consumer: {}, Idle: {}ms, Deliveries: {}",
                    i + 1,
                    p.id,
                    p.consumer,
                    p.idle_ms,
                    p.deliveries
                )?;
            }
        }

        write!(f, "{RULE}")
    }
}

/// Aggregates stream and group state without mutating anything.
pub struct Monitor<S> {
    store: S,
    config: PipelineConfig,
}

impl<S: LogStore> Monitor<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn snapshot(&self) -> Result<PipelineSnapshot, StoreError> {
        let cfg = &self.config;
        let main_stream_length = self.store.stream_len(&cfg.stream_name)?;
        let dlq_stream_length = self.store.stream_len(&cfg.dlq_stream)?;

        let group = self
            .store
            .group_info(&cfg.stream_name)?
            .into_iter()
            .find(|g| g.name == cfg.consumer_group);

        let pending = match group {
            Some(_) => self.store.pending_detail(
                &cfg.stream_name,
                &cfg.consumer_group,
                PENDING_DETAIL_LIMIT,
            )?,
            None => Vec::new(),
        };

        Ok(PipelineSnapshot {
            stream_name: cfg.stream_name.clone(),
            dlq_stream: cfg.dlq_stream.clone(),
            consumer_group: cfg.consumer_group.clone(),
            main_stream_length,
            dlq_stream_length,
            group,
            pending,
            captured_at: Utc::now(),
        })
    }

    /// Poll every `interval` until `stop` fires, handing each snapshot to `sink`.
    ///
    /// A failed poll is logged and skipped; the loop keeps its cadence.
    pub fn run(&self, interval: Duration, stop: &StopSignal, mut sink: impl FnMut(&PipelineSnapshot)) {
        info!(interval_secs = interval.as_secs_f64(), "monitor started");

        while !stop.is_stopped() {
            match self.snapshot() {
                Ok(snapshot) => sink(&snapshot),
                Err(e) => error!(error = %e, "monitor poll failed"),
            }
            if stop.sleep(interval) {
                break;
            }
        }

        info!("monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use eventline_core::{Event, Payload};
    use eventline_events::{GroupStart, InMemoryLogStore};

    use super::*;
    use crate::test_support::{FaultyStore, Op};

    fn seeded(entries: i64) -> Arc<InMemoryLogStore> {
        let store = Arc::new(InMemoryLogStore::new());
        for id in 1..=entries {
            store
                .append("events", &Event::new(id, "test", Payload::new()).to_fields())
                .unwrap();
        }
        store
    }

    #[test]
    fn snapshot_without_group_reports_lengths_only() {
        let store = seeded(3);
        let snapshot = Monitor::new(store, PipelineConfig::default()).snapshot().unwrap();

        assert_eq!(snapshot.main_stream_length, 3);
        assert_eq!(snapshot.dlq_stream_length, 0);
        assert!(snapshot.group.is_none());
        assert!(snapshot.pending.is_empty());
    }

    #[test]
    fn snapshot_reports_pending_ownership() {
        let store = seeded(8);
        store.ensure_group("events", "event_group", GroupStart::Origin).unwrap();
        store.ensure_group("events", "other", GroupStart::Origin).unwrap();
        store
            .claim("events", "event_group", "consumer-1", 7, Duration::ZERO)
            .unwrap();

        let snapshot = Monitor::new(store.clone(), PipelineConfig::default())
            .snapshot()
            .unwrap();

        let group = snapshot.group.as_ref().unwrap();
        assert_eq!(group.name, "event_group");
        assert_eq!(group.consumers, 1);
        assert_eq!(group.pending, 7);
        assert_eq!(snapshot.pending.len(), 7);
        assert!(snapshot.pending.iter().all(|p| p.consumer == "consumer-1"));

        // Read-only: nothing was acknowledged or released.
        assert_eq!(store.group_info("events").unwrap()[0].pending, 7);
    }

    #[test]
    fn display_lists_at_most_five_pending_entries() {
        let store = seeded(8);
        store.ensure_group("events", "event_group", GroupStart::Origin).unwrap();
        store
            .claim("events", "event_group", "consumer-1", 8, Duration::ZERO)
            .unwrap();

        let text = Monitor::new(store, PipelineConfig::default())
            .snapshot()
            .unwrap()
            .to_string();

        assert!(text.contains("Main Stream (events): 8 messages"));
        assert!(text.contains("Pending Messages: 8"));
        assert!(text.contains("  5. ID: 5-0, Consumer: consumer-1"));
        assert!(!text.contains("  6. ID:"));
    }

    #[test]
    fn snapshot_serializes_as_json() {
        let snapshot = Monitor::new(seeded(1), PipelineConfig::default())
            .snapshot()
            .unwrap();

        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["main_stream_length"], 1);
        assert!(json["group"].is_null());
    }

    #[test]
    fn failed_polls_do_not_stop_the_loop() {
        let store = Arc::new(FaultyStore::new());
        store.fail_times(Op::StreamLen, StoreError::transient("refused"), 2);
        let monitor = Monitor::new(store.clone(), PipelineConfig::default());
        let stop = StopSignal::new();

        let stopper = {
            let stop = stop.clone();
            let store = store.clone();
            thread::spawn(move || {
                while store.calls(Op::StreamLen) < 6 {
                    thread::sleep(Duration::from_millis(1));
                }
                stop.stop();
            })
        };

        let mut delivered = 0;
        monitor.run(Duration::from_millis(1), &stop, |_| delivered += 1);
        stopper.join().unwrap();

        assert!(delivered >= 1);
        assert!(store.calls(Op::StreamLen) >= 6);
    }
}
