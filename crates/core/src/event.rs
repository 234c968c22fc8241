use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Event payload: a key-ordered map of JSON values.
pub type Payload = serde_json::Map<String, JsonValue>;

/// The unit of work flowing through the pipeline.
///
/// Events are:
/// - **immutable** once produced, except for `retry_count`
/// - **opaque** to the pipeline: `event_type` only matters to processors
/// - **reconstructed** from their stream entry on every delivery, so
///   `retry_count` always reflects the persisted value, never in-memory state
///
/// `id` is assigned by the caller; uniqueness is the producer's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Payload,
    /// Creation time, fractional epoch seconds.
    pub timestamp: f64,
    #[serde(default)]
    pub retry_count: u32,
}

impl Event {
    /// Create a fresh event stamped with the current time.
    pub fn new(id: i64, event_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            payload,
            timestamp: now_epoch_seconds(),
            retry_count: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// The same event as seen by the next reprocessing attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }
}

pub(crate) fn now_epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_starts_with_zero_retries_and_current_time() {
        let before = now_epoch_seconds();
        let event = Event::new(1, "test", Payload::new());
        let after = now_epoch_seconds();

        assert_eq!(event.retry_count, 0);
        assert!(event.timestamp >= before && event.timestamp <= after);
    }

    #[test]
    fn next_attempt_increments_only_the_retry_counter() {
        let mut payload = Payload::new();
        payload.insert("data".into(), JsonValue::from("value 1"));
        let event = Event::new(7, "retry", payload).with_retry_count(2);

        let next = event.next_attempt();

        assert_eq!(next.retry_count, 3);
        assert_eq!(next.id, event.id);
        assert_eq!(next.event_type, event.event_type);
        assert_eq!(next.payload, event.payload);
        assert_eq!(next.timestamp, event.timestamp);
    }

    #[test]
    fn serializes_type_under_its_wire_name() {
        let event = Event::new(1, "order", Payload::new()).with_timestamp(10.5);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "order");
        assert!(json.get("event_type").is_none());
    }
}
