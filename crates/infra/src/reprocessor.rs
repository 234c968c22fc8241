//! Dead-letter reprocessing.
//!
//! A pass walks the DLQ stream oldest-first in batches and retries each entry
//! with its retry counter bumped by one:
//!
//! - persisted `retry_count >= max_retries` → skipped, left in the DLQ
//! - processor success → entry deleted from the DLQ
//! - processor failure → entry left untouched; the bumped counter is not
//!   written back, so the next pass starts from the same persisted value
//!
//! A pass ends when a read comes back empty or short. Every read starts after
//! the last entry seen, so entries left in place are visited once per pass.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use eventline_core::entry::FIELD_RETRY_COUNT;
use eventline_core::{DecodeError, EntryId, Event, StreamEntry, retry_count_of};
use eventline_events::{EventProcessor, LogStore, StoreError, invoke};

pub const DEFAULT_REPROCESS_BATCH: usize = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Totals for one reprocessing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessReport {
    /// Entries reprocessed successfully and removed from the DLQ.
    pub processed: u64,
    /// Entries that failed again and remain in the DLQ.
    pub failed: u64,
    /// Entries at or past the retry ceiling, not attempted.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Processed,
    Failed,
    Skipped,
}

pub struct DlqReprocessor<S> {
    store: S,
    processor: Arc<dyn EventProcessor>,
    dlq_stream: String,
}

impl<S: LogStore> DlqReprocessor<S> {
    pub fn new(store: S, processor: Arc<dyn EventProcessor>, dlq_stream: impl Into<String>) -> Self {
        Self {
            store,
            processor,
            dlq_stream: dlq_stream.into(),
        }
    }

    pub fn dlq_stream(&self) -> &str {
        &self.dlq_stream
    }

    /// Run one pass over the current DLQ backlog.
    ///
    /// Per-entry failures are counted, never returned. `Err` means a DLQ read
    /// failed and the pass was cut short.
    #[instrument(skip(self), fields(dlq = %self.dlq_stream), err)]
    pub fn reprocess(
        &self,
        batch_size: usize,
        max_retries: u32,
    ) -> Result<ReprocessReport, StoreError> {
        let mut report = ReprocessReport::default();
        let mut cursor: Option<EntryId> = None;

        loop {
            let batch = self
                .store
                .range(&self.dlq_stream, cursor.as_ref(), batch_size)?;
            if batch.is_empty() {
                break;
            }

            for entry in &batch {
                match self.attempt(entry, max_retries) {
                    Attempt::Processed => report.processed += 1,
                    Attempt::Failed => report.failed += 1,
                    Attempt::Skipped => report.skipped += 1,
                }
            }

            cursor = batch.last().map(|e| e.id.clone());
            if batch.len() < batch_size {
                break;
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "dlq reprocessing pass complete"
        );
        Ok(report)
    }

    fn attempt(&self, entry: &StreamEntry, max_retries: u32) -> Attempt {
        let persisted = retry_count_of(&entry.fields);
        if persisted >= max_retries {
            warn!(
                entry_id = %entry.id,
                retry_count = persisted,
                max_retries,
                "retries exhausted, leaving entry for manual intervention"
            );
            return Attempt::Skipped;
        }

        let event = match decode_attempt(entry, persisted) {
            Ok(event) => event,
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "undecodable dlq entry");
                return Attempt::Failed;
            }
        };

        if let Err(e) = invoke(self.processor.as_ref(), &event) {
            warn!(
                entry_id = %entry.id,
                retry_count = event.retry_count,
                error = %e,
                "reprocessing failed"
            );
            return Attempt::Failed;
        }

        match self.store.delete(&self.dlq_stream, &entry.id) {
            Ok(()) => {
                debug!(entry_id = %entry.id, retry_count = event.retry_count, "reprocessed");
                Attempt::Processed
            }
            Err(e) => {
                error!(entry_id = %entry.id, error = %e, "delete after reprocess failed");
                Attempt::Failed
            }
        }
    }
}

/// The event as the next attempt sees it: persisted counter plus one.
///
/// The counter is taken from `persisted` rather than the raw field so that a
/// damaged counter reads as 0 instead of making the entry undecodable.
fn decode_attempt(entry: &StreamEntry, persisted: u32) -> Result<Event, DecodeError> {
    let mut fields = entry.fields.clone();
    fields.remove(FIELD_RETRY_COUNT);
    Ok(Event::from_fields(&fields)?
        .with_retry_count(persisted)
        .next_attempt())
}
