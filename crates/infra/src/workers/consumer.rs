//! Consumer worker: claim, process, then acknowledge or dead-letter.
//!
//! ## State machine
//!
//! ```text
//! Initializing ──(group ready)──▶ Consuming ──(stop signal)──▶ Stopped
//!       │
//!       └──(group setup failed)──▶ Stopped (returns ConsumerError)
//! ```
//!
//! ## Per-entry routing
//!
//! - processor success → `ack` on the main stream
//! - processor failure, panic, or undecodable entry → append the **raw** entry
//!   fields to the dead-letter stream, then `ack` on the main stream
//!
//! If the dead-letter append fails the entry is *not* acknowledged. It stays in
//! this consumer's pending list and is picked up again by the recovery pass,
//! so a claimed entry is never dropped. If the append succeeds but the `ack`
//! fails, the consumer remembers the id and the recovery pass only retries the
//! `ack`, so the dead-letter stream never holds the same delivery twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use eventline_core::{DecodeError, EntryId, StreamEntry};
use eventline_events::{
    EventProcessor, GroupStart, LogStore, ProcessingError, StopSignal, StoreError, invoke,
};

use crate::config::PipelineConfig;

/// Backoff after a connectivity failure while claiming.
pub const DEFAULT_TRANSIENT_BACKOFF: Duration = Duration::from_secs(5);
/// Backoff after any other unexpected failure.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub stream: String,
    pub dlq_stream: String,
    pub group: String,
    /// Consumer identity within the group; must be unique per worker.
    pub name: String,
    pub batch_size: usize,
    pub block: Duration,
    pub transient_backoff: Duration,
    pub error_backoff: Duration,
}

impl ConsumerConfig {
    pub fn from_pipeline(pipeline: &PipelineConfig, name: impl Into<String>) -> Self {
        Self {
            stream: pipeline.stream_name.clone(),
            dlq_stream: pipeline.dlq_stream.clone(),
            group: pipeline.consumer_group.clone(),
            name: name.into(),
            batch_size: pipeline.batch_size,
            block: pipeline.processing_timeout,
            transient_backoff: DEFAULT_TRANSIENT_BACKOFF,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, transient: Duration, error: Duration) -> Self {
        self.transient_backoff = transient;
        self.error_backoff = error;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Initializing,
    Consuming,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer group `{group}` setup on `{stream}` failed: {source}")]
    GroupSetup {
        stream: String,
        group: String,
        #[source]
        source: StoreError,
    },
}

/// Where a claimed entry ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Acknowledged,
    DeadLettered,
}

/// Why an entry was dead-lettered.
#[derive(Debug, Error)]
enum EntryFailure {
    #[error("undecodable entry: {0}")]
    Decode(#[from] DecodeError),

    #[error("processing failed: {0}")]
    Processing(#[from] ProcessingError),
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub claimed: u64,
    pub acknowledged: u64,
    pub dead_lettered: u64,
    pub store_errors: u64,
}

impl ConsumerStats {
    pub fn merge(&mut self, other: &ConsumerStats) {
        self.claimed += other.claimed;
        self.acknowledged += other.acknowledged;
        self.dead_lettered += other.dead_lettered;
        self.store_errors += other.store_errors;
    }
}

/// One consumer identity within a consumer group.
///
/// Entries are handled one at a time, in claim order, each routed to
/// completion before the next claim.
pub struct Consumer<S> {
    store: S,
    processor: Arc<dyn EventProcessor>,
    config: ConsumerConfig,
    stop: StopSignal,
    state: Mutex<ConsumerState>,
    stats: Mutex<ConsumerStats>,
    // Drain our own pending list before claiming new entries.
    recovering: AtomicBool,
    // Already in the dead-letter stream; only the ack is outstanding.
    unacked_dead_letters: Mutex<HashSet<EntryId>>,
}

impl<S> core::fmt::Debug for Consumer<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Consumer")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<S: LogStore> Consumer<S> {
    pub fn new(
        store: S,
        processor: Arc<dyn EventProcessor>,
        config: ConsumerConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            store,
            processor,
            config,
            stop,
            state: Mutex::new(ConsumerState::Initializing),
            stats: Mutex::new(ConsumerStats::default()),
            recovering: AtomicBool::new(true),
            unacked_dead_letters: Mutex::new(HashSet::new()),
        }
    }

    /// Ensure the consumer group exists at the stream origin.
    pub fn initialize(&self) -> Result<(), ConsumerError> {
        self.store
            .ensure_group(&self.config.stream, &self.config.group, GroupStart::Origin)
            .map_err(|source| ConsumerError::GroupSetup {
                stream: self.config.stream.clone(),
                group: self.config.group.clone(),
                source,
            })
    }

    /// Run until the stop signal fires.
    ///
    /// Only group setup failure ends the worker early; every other error is
    /// logged and followed by a backoff.
    pub fn run(&self) -> Result<(), ConsumerError> {
        self.set_state(ConsumerState::Initializing);
        if let Err(e) = self.initialize() {
            error!(consumer = %self.config.name, error = %e, "consumer startup failed");
            self.set_state(ConsumerState::Stopped);
            return Err(e);
        }

        self.set_state(ConsumerState::Consuming);
        info!(
            consumer = %self.config.name,
            group = %self.config.group,
            stream = %self.config.stream,
            "consumer started"
        );

        while !self.stop.is_stopped() {
            if let Err(e) = self.poll_once() {
                self.bump(|s| s.store_errors += 1);
                let backoff = if e.is_transient() {
                    warn!(consumer = %self.config.name, error = %e, "log store unreachable, backing off");
                    self.config.transient_backoff
                } else {
                    error!(consumer = %self.config.name, error = %e, "unexpected consumer error, backing off");
                    self.config.error_backoff
                };
                self.stop.sleep(backoff);
            }
        }

        self.set_state(ConsumerState::Stopped);
        info!(consumer = %self.config.name, "consumer stopped");
        Ok(())
    }

    /// One claim cycle: claim a batch and route every entry in it.
    ///
    /// Returns the number of entries claimed. An empty claim is not an error.
    pub fn poll_once(&self) -> Result<usize, StoreError> {
        let mut entries = Vec::new();

        if self.recovering.load(Ordering::SeqCst) {
            entries = self.store.claim_own_pending(
                &self.config.stream,
                &self.config.group,
                &self.config.name,
                self.config.batch_size,
            )?;
            if entries.is_empty() {
                self.recovering.store(false, Ordering::SeqCst);
            } else {
                info!(consumer = %self.config.name, count = entries.len(), "recovering pending entries");
            }
        }

        if entries.is_empty() {
            entries = self.store.claim(
                &self.config.stream,
                &self.config.group,
                &self.config.name,
                self.config.batch_size,
                self.config.block,
            )?;
        }

        if entries.is_empty() {
            return Ok(0);
        }

        self.bump(|s| s.claimed += entries.len() as u64);

        for entry in &entries {
            if let Err(e) = self.process_entry(entry) {
                // Whatever is left of this batch is still ours in the pending list.
                self.recovering.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }

        Ok(entries.len())
    }

    /// Route a single claimed entry.
    ///
    /// `Err` means the entry could not be routed and is still pending.
    pub fn process_entry(&self, entry: &StreamEntry) -> Result<EntryOutcome, StoreError> {
        if self.unacked_dead_letters().contains(&entry.id) {
            self.ack(entry)?;
            self.unacked_dead_letters().remove(&entry.id);
            debug!(consumer = %self.config.name, entry_id = %entry.id, "dead-letter ack completed");
            self.bump(|s| s.dead_lettered += 1);
            return Ok(EntryOutcome::DeadLettered);
        }

        let result: Result<(), EntryFailure> = entry
            .decode()
            .map_err(EntryFailure::from)
            .and_then(|event| invoke(self.processor.as_ref(), &event).map_err(EntryFailure::from));

        match result {
            Ok(()) => {
                self.ack(entry)?;
                debug!(consumer = %self.config.name, entry_id = %entry.id, "entry acknowledged");
                self.bump(|s| s.acknowledged += 1);
                Ok(EntryOutcome::Acknowledged)
            }
            Err(cause) => {
                warn!(
                    consumer = %self.config.name,
                    entry_id = %entry.id,
                    error = %cause,
                    "routing entry to dead-letter stream"
                );

                if let Err(e) = self.store.append(&self.config.dlq_stream, &entry.fields) {
                    error!(
                        consumer = %self.config.name,
                        entry_id = %entry.id,
                        error = %e,
                        "dead-letter append failed, leaving entry pending"
                    );
                    return Err(e);
                }

                if let Err(e) = self.ack(entry) {
                    self.unacked_dead_letters().insert(entry.id.clone());
                    return Err(e);
                }
                self.bump(|s| s.dead_lettered += 1);
                Ok(EntryOutcome::DeadLettered)
            }
        }
    }

    fn ack(&self, entry: &StreamEntry) -> Result<(), StoreError> {
        self.store
            .ack(&self.config.stream, &self.config.group, &entry.id)
            .inspect_err(|e| {
                error!(consumer = %self.config.name, entry_id = %entry.id, error = %e, "ack failed");
            })
    }
}

impl<S> Consumer<S> {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn unacked_dead_letters(&self) -> MutexGuard<'_, HashSet<EntryId>> {
        self.unacked_dead_letters
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn bump(&self, f: impl FnOnce(&mut ConsumerStats)) {
        if let Ok(mut s) = self.stats.lock() {
            f(&mut s);
        }
    }
}
