//! Fault-injecting log store wrapper for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use eventline_core::{EntryId, Fields, StreamEntry};
use eventline_events::{
    GroupInfo, GroupStart, InMemoryLogStore, LogStore, PendingEntry, StoreError, StoreResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Append,
    EnsureGroup,
    Claim,
    ClaimOwnPending,
    Ack,
    Range,
    Delete,
    StreamLen,
    GroupInfo,
    PendingDetail,
}

/// Wraps an [`InMemoryLogStore`], failing queued operations and counting calls.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryLogStore,
    faults: Mutex<HashMap<Op, VecDeque<StoreError>>>,
    calls: Mutex<HashMap<Op, usize>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryLogStore {
        &self.inner
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Op, err: StoreError) {
        self.fail_times(op, err, 1);
    }

    pub fn fail_times(&self, op: Op, err: StoreError, times: usize) {
        let mut faults = self.faults.lock().unwrap();
        let queue = faults.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: Op) -> StoreResult<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        match self.faults.lock().unwrap().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl LogStore for FaultyStore {
    fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        self.enter(Op::Append)?;
        self.inner.append(stream, fields)
    }

    fn ensure_group(&self, stream: &str, group: &str, start: GroupStart) -> StoreResult<()> {
        self.enter(Op::EnsureGroup)?;
        self.inner.ensure_group(stream, group, start)
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>> {
        self.enter(Op::Claim)?;
        self.inner.claim(stream, group, consumer, count, block)
    }

    fn claim_own_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        self.enter(Op::ClaimOwnPending)?;
        self.inner.claim_own_pending(stream, group, consumer, count)
    }

    fn ack(&self, stream: &str, group: &str, id: &EntryId) -> StoreResult<()> {
        self.enter(Op::Ack)?;
        self.inner.ack(stream, group, id)
    }

    fn range(
        &self,
        stream: &str,
        after: Option<&EntryId>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        self.enter(Op::Range)?;
        self.inner.range(stream, after, count)
    }

    fn delete(&self, stream: &str, id: &EntryId) -> StoreResult<()> {
        self.enter(Op::Delete)?;
        self.inner.delete(stream, id)
    }

    fn stream_len(&self, stream: &str) -> StoreResult<u64> {
        self.enter(Op::StreamLen)?;
        self.inner.stream_len(stream)
    }

    fn group_info(&self, stream: &str) -> StoreResult<Vec<GroupInfo>> {
        self.enter(Op::GroupInfo)?;
        self.inner.group_info(stream)
    }

    fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> StoreResult<Vec<PendingEntry>> {
        self.enter(Op::PendingDetail)?;
        self.inner.pending_detail(stream, group, count)
    }
}
