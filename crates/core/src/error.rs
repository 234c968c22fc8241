//! Decode error model.

use thiserror::Error;

/// Result type used when rebuilding events from stream entries.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A stream entry could not be turned back into an [`Event`](crate::Event).
///
/// Decoding failures are routed exactly like processing failures, so the
/// variants only need to carry enough context for the log line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required field is absent from the entry.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field value is not valid JSON.
    #[error("field `{field}` is not valid JSON: {reason}")]
    MalformedJson { field: &'static str, reason: String },

    /// A field value is valid JSON but not of the expected kind.
    #[error("field `{field}` has unexpected shape (expected {expected})")]
    UnexpectedShape {
        field: &'static str,
        expected: &'static str,
    },
}

impl DecodeError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedJson {
            field,
            reason: reason.into(),
        }
    }

    pub fn shape(field: &'static str, expected: &'static str) -> Self {
        Self::UnexpectedShape { field, expected }
    }
}
