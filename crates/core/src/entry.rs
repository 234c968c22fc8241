//! Stream entry wire form.
//!
//! An event is flattened into one field per attribute, each value being the
//! JSON encoding of that attribute:
//!
//! ```text
//! id          -> 1
//! type        -> "test"
//! payload     -> {"data":"value 1"}
//! timestamp   -> 1718000000.25
//! retry_count -> 0
//! ```
//!
//! Entry identity (the store-assigned ID) travels next to the fields, never
//! inside them.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::{DecodeError, DecodeResult};
use crate::event::{Event, Payload, now_epoch_seconds};

pub const FIELD_ID: &str = "id";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_RETRY_COUNT: &str = "retry_count";

/// Flat field map persisted by the log store.
pub type Fields = BTreeMap<String, String>;

/// Opaque, store-assigned entry identifier (monotonic within a stream).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An entry as read back from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: EntryId,
    pub fields: Fields,
}

impl StreamEntry {
    pub fn new(id: impl Into<EntryId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Rebuild the event carried by this entry.
    pub fn decode(&self) -> DecodeResult<Event> {
        Event::from_fields(&self.fields)
    }
}

impl Event {
    /// Flatten into the per-attribute JSON field map.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_ID.into(), JsonValue::from(self.id).to_string());
        fields.insert(FIELD_TYPE.into(), JsonValue::from(self.event_type.as_str()).to_string());
        fields.insert(
            FIELD_PAYLOAD.into(),
            JsonValue::Object(self.payload.clone()).to_string(),
        );
        fields.insert(FIELD_TIMESTAMP.into(), JsonValue::from(self.timestamp).to_string());
        fields.insert(FIELD_RETRY_COUNT.into(), JsonValue::from(self.retry_count).to_string());
        fields
    }

    /// Rebuild an event from its field map.
    ///
    /// `id`, `type` and `payload` are required. A missing `timestamp` defaults
    /// to now and a missing `retry_count` to 0. Unknown fields are ignored.
    pub fn from_fields(fields: &Fields) -> DecodeResult<Self> {
        let id = required(fields, FIELD_ID)?
            .as_i64()
            .ok_or(DecodeError::shape(FIELD_ID, "integer"))?;

        let event_type = match required(fields, FIELD_TYPE)? {
            JsonValue::String(s) => s,
            _ => return Err(DecodeError::shape(FIELD_TYPE, "string")),
        };

        let payload: Payload = match required(fields, FIELD_PAYLOAD)? {
            JsonValue::Object(map) => map,
            _ => return Err(DecodeError::shape(FIELD_PAYLOAD, "object")),
        };

        let timestamp = match optional(fields, FIELD_TIMESTAMP)? {
            Some(v) => v
                .as_f64()
                .ok_or(DecodeError::shape(FIELD_TIMESTAMP, "number"))?,
            None => now_epoch_seconds(),
        };

        let retry_count = match optional(fields, FIELD_RETRY_COUNT)? {
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(DecodeError::shape(FIELD_RETRY_COUNT, "non-negative integer"))?,
            None => 0,
        };

        Ok(Self {
            id,
            event_type,
            payload,
            timestamp,
            retry_count,
        })
    }
}

/// Persisted retry counter of an entry, leniently.
///
/// Missing, non-numeric or negative values count as 0 so that a damaged
/// counter never pushes an entry past the retry ceiling on its own. Numbers
/// are floored and saturate at `u32::MAX`, so `3.0` or `4294967296` still
/// compare as at-or-above any ceiling they exceed.
pub fn retry_count_of(fields: &Fields) -> u32 {
    let Some(value) = fields
        .get(FIELD_RETRY_COUNT)
        .and_then(|raw| serde_json::from_str::<JsonValue>(raw).ok())
    else {
        return 0;
    };

    if let Some(n) = value.as_u64() {
        return u32::try_from(n).unwrap_or(u32::MAX);
    }
    match value.as_f64() {
        // `as` saturates on overflow.
        Some(f) if f.is_finite() && f > 0.0 => f.floor() as u32,
        _ => 0,
    }
}

fn required(fields: &Fields, name: &'static str) -> DecodeResult<JsonValue> {
    optional(fields, name)?.ok_or(DecodeError::MissingField(name))
}

fn optional(fields: &Fields, name: &'static str) -> DecodeResult<Option<JsonValue>> {
    fields
        .get(name)
        .map(|raw| serde_json::from_str(raw).map_err(|e| DecodeError::malformed(name, e.to_string())))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Event {
        let mut payload = Payload::new();
        payload.insert("data".into(), JsonValue::from("value 1"));
        payload.insert("amount".into(), JsonValue::from(12));
        Event::new(1, "test", payload).with_timestamp(1_718_000_000.25)
    }

    #[test]
    fn every_attribute_becomes_a_json_encoded_field() {
        let fields = sample().to_fields();

        assert_eq!(fields.len(), 5);
        assert_eq!(fields[FIELD_ID], "1");
        assert_eq!(fields[FIELD_TYPE], "\"test\"");
        assert_eq!(fields[FIELD_PAYLOAD], r#"{"amount":12,"data":"value 1"}"#);
        assert_eq!(fields[FIELD_TIMESTAMP], "1718000000.25");
        assert_eq!(fields[FIELD_RETRY_COUNT], "0");
    }

    #[test]
    fn decode_restores_the_event() {
        let event = sample().with_retry_count(2);
        let entry = StreamEntry::new("1-0", event.to_fields());

        assert_eq!(entry.decode().unwrap(), event);
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let mut fields = sample().to_fields();
        fields.remove(FIELD_TIMESTAMP);
        fields.remove(FIELD_RETRY_COUNT);

        let event = Event::from_fields(&fields).unwrap();

        assert_eq!(event.retry_count, 0);
        assert!(event.timestamp > 0.0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut fields = sample().to_fields();
        fields.insert("origin".into(), "\"replay\"".into());

        assert!(Event::from_fields(&fields).is_ok());
    }

    #[test]
    fn missing_type_is_rejected() {
        let mut fields = sample().to_fields();
        fields.remove(FIELD_TYPE);

        assert_eq!(
            Event::from_fields(&fields),
            Err(DecodeError::MissingField(FIELD_TYPE))
        );
    }

    #[test]
    fn raw_unquoted_type_is_malformed_json() {
        let mut fields = sample().to_fields();
        fields.insert(FIELD_TYPE.into(), "test".into());

        assert!(matches!(
            Event::from_fields(&fields),
            Err(DecodeError::MalformedJson { field: FIELD_TYPE, .. })
        ));
    }

    #[test]
    fn payload_must_be_an_object() {
        let mut fields = sample().to_fields();
        fields.insert(FIELD_PAYLOAD.into(), "[1,2]".into());

        assert_eq!(
            Event::from_fields(&fields),
            Err(DecodeError::shape(FIELD_PAYLOAD, "object"))
        );
    }

    #[test]
    fn negative_retry_count_is_rejected_by_strict_decode() {
        let mut fields = sample().to_fields();
        fields.insert(FIELD_RETRY_COUNT.into(), "-1".into());

        assert!(Event::from_fields(&fields).is_err());
    }

    #[test]
    fn lenient_retry_count_falls_back_to_zero() {
        let mut fields = Fields::new();
        assert_eq!(retry_count_of(&fields), 0);

        fields.insert(FIELD_RETRY_COUNT.into(), "not json".into());
        assert_eq!(retry_count_of(&fields), 0);

        fields.insert(FIELD_RETRY_COUNT.into(), "\"3\"".into());
        assert_eq!(retry_count_of(&fields), 0);

        fields.insert(FIELD_RETRY_COUNT.into(), "4".into());
        assert_eq!(retry_count_of(&fields), 4);

        fields.insert(FIELD_RETRY_COUNT.into(), "-2".into());
        assert_eq!(retry_count_of(&fields), 0);
    }

    #[test]
    fn lenient_retry_count_keeps_large_and_float_values() {
        let mut fields = Fields::new();

        fields.insert(FIELD_RETRY_COUNT.into(), "3.0".into());
        assert_eq!(retry_count_of(&fields), 3);

        fields.insert(FIELD_RETRY_COUNT.into(), "3.7".into());
        assert_eq!(retry_count_of(&fields), 3);

        fields.insert(FIELD_RETRY_COUNT.into(), "4294967296".into());
        assert_eq!(retry_count_of(&fields), u32::MAX);

        fields.insert(FIELD_RETRY_COUNT.into(), "1e30".into());
        assert_eq!(retry_count_of(&fields), u32::MAX);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the persisted retry counter is what a decode sees.
            #[test]
            fn decoded_retry_count_matches_persisted(
                id in any::<i64>(),
                retries in 0u32..1000,
                event_type in "[a-z]{1,12}",
            ) {
                let event = Event::new(id, event_type, Payload::new()).with_retry_count(retries);
                let fields = event.to_fields();

                prop_assert_eq!(retry_count_of(&fields), retries);
                prop_assert_eq!(Event::from_fields(&fields).unwrap().retry_count, retries);
            }
        }
    }
}
