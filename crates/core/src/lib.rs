//! `eventline-core`: the event model and its stream-entry wire form.
//!
//! This crate is **pure** (no IO): it defines what an event is and how it is
//! flattened into the field map a log store persists.

pub mod entry;
pub mod error;
pub mod event;

pub use entry::{EntryId, Fields, StreamEntry, retry_count_of};
pub use error::{DecodeError, DecodeResult};
pub use event::{Event, Payload};
