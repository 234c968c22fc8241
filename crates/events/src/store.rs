//! Append-only log store boundary (mechanics only).
//!
//! The pipeline never tracks delivery state itself. Claim ownership, the
//! pending-entry list and delivery counters all belong to the store; the
//! pipeline mutates them only through `append`, `claim`, `ack` and `delete`.
//!
//! ## Streams and groups
//!
//! - A **stream** is an ID-ordered, append-only log of [`StreamEntry`]s.
//! - A **consumer group** is a cursor plus a pending-entry list over one stream.
//!   Each claimed entry is owned by exactly one consumer identity until it is
//!   acknowledged.
//!
//! ## Errors
//!
//! Implementations classify failures so callers can choose a backoff:
//! connectivity problems are [`StoreError::Transient`], everything the store
//! rejected outright is [`StoreError::Command`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use eventline_core::{EntryId, Fields, StreamEntry};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (refused, dropped, timed out).
    #[error("log store unreachable: {0}")]
    Transient(String),

    /// Group creation hit an existing group. `ensure_group` swallows this.
    #[error("consumer group already exists: {0}")]
    GroupAlreadyExists(String),

    /// The store rejected the command.
    #[error("log store command failed: {0}")]
    Command(String),

    /// In-process state is unusable after a panic while holding its lock.
    #[error("log store state poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Where a newly created group starts reading.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum GroupStart {
    /// Beginning of the stream: every existing entry will be delivered.
    #[default]
    Origin,
    /// Current tail: only entries appended after creation are delivered.
    Latest,
}

/// Consumer-group metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub consumers: u64,
    pub pending: u64,
    pub last_delivered_id: EntryId,
}

/// One record of a group's pending-entry list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEntry {
    pub id: EntryId,
    pub consumer: String,
    pub idle_ms: u64,
    pub deliveries: u64,
}

/// Durable stream storage with consumer-group bookkeeping.
///
/// All operations are synchronous; `claim` is the only one allowed to block,
/// and only for up to `block`. A zero `block` never waits.
pub trait LogStore: Send + Sync {
    /// Durable, ordered append. Returns the store-assigned entry ID.
    fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId>;

    /// Create `group` on `stream` (creating the stream if absent).
    ///
    /// Idempotent: an existing group is left untouched and is not an error.
    fn ensure_group(&self, stream: &str, group: &str, start: GroupStart) -> StoreResult<()>;

    /// Claim up to `count` never-delivered entries for `consumer`.
    ///
    /// An empty result after `block` elapses is not an error.
    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>>;

    /// Re-read entries already delivered to `consumer` and not yet acknowledged.
    ///
    /// Entries deleted from the stream while pending are released from the
    /// pending list and not returned.
    fn claim_own_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>>;

    /// Remove `id` from the group's pending list. Idempotent.
    fn ack(&self, stream: &str, group: &str, id: &EntryId) -> StoreResult<()>;

    /// Oldest-first read of up to `count` entries strictly after `after`.
    ///
    /// Does not touch any group state.
    fn range(
        &self,
        stream: &str,
        after: Option<&EntryId>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>>;

    /// Permanently remove `id` from `stream`. Idempotent.
    fn delete(&self, stream: &str, id: &EntryId) -> StoreResult<()>;

    /// Number of entries currently in `stream` (0 when absent).
    fn stream_len(&self, stream: &str) -> StoreResult<u64>;

    /// Metadata of every group on `stream` (empty when absent).
    fn group_info(&self, stream: &str) -> StoreResult<Vec<GroupInfo>>;

    /// Up to `count` pending records of `group`, oldest first.
    fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> StoreResult<Vec<PendingEntry>>;
}

impl<S> LogStore for Arc<S>
where
    S: LogStore + ?Sized,
{
    fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        (**self).append(stream, fields)
    }

    fn ensure_group(&self, stream: &str, group: &str, start: GroupStart) -> StoreResult<()> {
        (**self).ensure_group(stream, group, start)
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>> {
        (**self).claim(stream, group, consumer, count, block)
    }

    fn claim_own_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        (**self).claim_own_pending(stream, group, consumer, count)
    }

    fn ack(&self, stream: &str, group: &str, id: &EntryId) -> StoreResult<()> {
        (**self).ack(stream, group, id)
    }

    fn range(
        &self,
        stream: &str,
        after: Option<&EntryId>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        (**self).range(stream, after, count)
    }

    fn delete(&self, stream: &str, id: &EntryId) -> StoreResult<()> {
        (**self).delete(stream, id)
    }

    fn stream_len(&self, stream: &str) -> StoreResult<u64> {
        (**self).stream_len(stream)
    }

    fn group_info(&self, stream: &str) -> StoreResult<Vec<GroupInfo>> {
        (**self).group_info(stream)
    }

    fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> StoreResult<Vec<PendingEntry>> {
        (**self).pending_detail(stream, group, count)
    }
}
