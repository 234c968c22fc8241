//! Event producer: builds events and appends them to the main stream.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument};

use eventline_core::{EntryId, Event, Payload};
use eventline_events::{LogStore, StoreError};

/// Type tags cycled by [`Producer::next_demo_event`].
pub const DEMO_EVENT_TYPES: [&str; 4] = ["test", "order", "fail", "retry"];

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("append to `{stream}` failed: {source}")]
    Append {
        stream: String,
        #[source]
        source: StoreError,
    },
}

impl ProduceError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProduceError::Append { source, .. } => source.is_transient(),
        }
    }
}

/// Appends events to one stream.
///
/// - One durable append per `produce` call
/// - No buffering, no internal retries: backoff is the caller's decision
/// - The id counter is owned by this instance; two producers never share it
#[derive(Debug)]
pub struct Producer<S> {
    store: S,
    stream: String,
    next_id: AtomicI64,
}

impl<S: LogStore> Producer<S> {
    pub fn new(store: S, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Start the id counter at `first_id` instead of 1.
    pub fn starting_at(self, first_id: i64) -> Self {
        self.next_id.store(first_id, Ordering::SeqCst);
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Append `event` to the stream, returning the store-assigned entry id.
    #[instrument(skip(self, event), fields(stream = %self.stream, event_id = event.id), err)]
    pub fn produce(&self, event: &Event) -> Result<EntryId, ProduceError> {
        let entry_id = self
            .store
            .append(&self.stream, &event.to_fields())
            .map_err(|source| ProduceError::Append {
                stream: self.stream.clone(),
                source,
            })?;

        info!(%entry_id, event_type = %event.event_type, "produced event");
        Ok(entry_id)
    }

    /// Build an event carrying the next id from this producer's counter.
    pub fn next_event(&self, event_type: impl Into<String>, payload: Payload) -> Event {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Event::new(id, event_type, payload)
    }

    /// Synthetic event for demos: cycles [`DEMO_EVENT_TYPES`] so the failure
    /// and retry paths get exercised.
    pub fn next_demo_event(&self) -> Event {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event_type = DEMO_EVENT_TYPES[(id.rem_euclid(DEMO_EVENT_TYPES.len() as i64)) as usize];

        let mut payload = Payload::new();
        payload.insert("data".into(), JsonValue::from(format!("value {id}")));

        Event::new(id, event_type, payload)
    }
}
