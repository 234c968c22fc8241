//! In-memory log store for tests/dev.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use eventline_core::{EntryId, Fields, StreamEntry};

use crate::store::{GroupInfo, GroupStart, LogStore, PendingEntry, StoreError, StoreResult};

#[derive(Debug)]
struct PendingRecord {
    consumer: String,
    delivered_at: Instant,
    deliveries: u64,
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: u64,
    consumers: BTreeSet<String>,
    pending: BTreeMap<u64, PendingRecord>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<u64, Fields>,
    last_seq: u64,
    groups: BTreeMap<String, Group>,
}

impl Stream {
    fn group_mut(&mut self, stream: &str, group: &str) -> StoreResult<&mut Group> {
        self.groups.get_mut(group).ok_or_else(|| no_group(stream, group))
    }
}

/// In-memory stream store with Redis-like consumer-group semantics.
///
/// - IDs are `<seq>-0`, monotonically increasing per stream
/// - `claim` blocks on a condition variable until an append or the timeout
/// - Deleted entries keep their pending records until acknowledged
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Condvar,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently in `stream`, oldest first.
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        self.lock()
            .map(|streams| {
                streams
                    .get(stream)
                    .map(|s| {
                        s.entries
                            .iter()
                            .map(|(seq, fields)| StreamEntry::new(format_id(*seq), fields.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Stream>>> {
        self.streams.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn format_id(seq: u64) -> EntryId {
    EntryId::new(format!("{seq}-0"))
}

fn parse_id(id: &EntryId) -> StoreResult<u64> {
    id.as_str()
        .split_once('-')
        .and_then(|(seq, _)| seq.parse().ok())
        .ok_or_else(|| StoreError::command(format!("invalid stream ID `{id}`")))
}

fn no_group(stream: &str, group: &str) -> StoreError {
    StoreError::command(format!("NOGROUP no consumer group `{group}` on stream `{stream}`"))
}

impl LogStore for InMemoryLogStore {
    fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        let mut streams = self.lock()?;
        let s = streams.entry(stream.to_string()).or_default();
        s.last_seq += 1;
        let seq = s.last_seq;
        s.entries.insert(seq, fields.clone());
        drop(streams);

        self.appended.notify_all();
        Ok(format_id(seq))
    }

    fn ensure_group(&self, stream: &str, group: &str, start: GroupStart) -> StoreResult<()> {
        let mut streams = self.lock()?;
        let s = streams.entry(stream.to_string()).or_default();
        let last_delivered = match start {
            GroupStart::Origin => 0,
            GroupStart::Latest => s.last_seq,
        };
        s.groups.entry(group.to_string()).or_insert_with(|| Group {
            last_delivered,
            ..Group::default()
        });
        Ok(())
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;
        let mut streams = self.lock()?;

        loop {
            let s = streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
            let from = s.group_mut(stream, group)?.last_delivered + 1;
            let claimed: Vec<(u64, Fields)> = s
                .entries
                .range(from..)
                .take(count)
                .map(|(seq, fields)| (*seq, fields.clone()))
                .collect();

            let g = s.group_mut(stream, group)?;
            g.consumers.insert(consumer.to_string());

            if !claimed.is_empty() {
                let now = Instant::now();
                for (seq, _) in &claimed {
                    g.pending.insert(
                        *seq,
                        PendingRecord {
                            consumer: consumer.to_string(),
                            delivered_at: now,
                            deliveries: 1,
                        },
                    );
                }
                g.last_delivered = claimed.last().map(|(seq, _)| *seq).unwrap_or(g.last_delivered);

                return Ok(claimed
                    .into_iter()
                    .map(|(seq, fields)| StreamEntry::new(format_id(seq), fields))
                    .collect());
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(vec![]);
            }
            let (guard, _) = self
                .appended
                .wait_timeout(streams, deadline - now)
                .map_err(|_| StoreError::Poisoned)?;
            streams = guard;
        }
    }

    fn claim_own_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut streams = self.lock()?;
        let s = streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let Stream { entries, groups, .. } = s;
        let g = groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;
        g.consumers.insert(consumer.to_string());

        let owned: Vec<u64> = g
            .pending
            .iter()
            .filter(|(_, rec)| rec.consumer == consumer)
            .map(|(seq, _)| *seq)
            .collect();

        let now = Instant::now();
        let mut out = Vec::new();
        for seq in owned {
            if out.len() >= count {
                break;
            }
            match entries.get(&seq) {
                Some(fields) => {
                    if let Some(rec) = g.pending.get_mut(&seq) {
                        rec.deliveries += 1;
                        rec.delivered_at = now;
                    }
                    out.push(StreamEntry::new(format_id(seq), fields.clone()));
                }
                None => {
                    g.pending.remove(&seq);
                }
            }
        }
        Ok(out)
    }

    fn ack(&self, stream: &str, group: &str, id: &EntryId) -> StoreResult<()> {
        let seq = parse_id(id)?;
        let mut streams = self.lock()?;
        let s = streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        s.group_mut(stream, group)?.pending.remove(&seq);
        Ok(())
    }

    fn range(
        &self,
        stream: &str,
        after: Option<&EntryId>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let from = match after {
            Some(id) => parse_id(id)? + 1,
            None => 0,
        };
        let streams = self.lock()?;
        Ok(streams
            .get(stream)
            .map(|s| {
                s.entries
                    .range(from..)
                    .take(count)
                    .map(|(seq, fields)| StreamEntry::new(format_id(*seq), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&self, stream: &str, id: &EntryId) -> StoreResult<()> {
        let seq = parse_id(id)?;
        let mut streams = self.lock()?;
        if let Some(s) = streams.get_mut(stream) {
            s.entries.remove(&seq);
        }
        Ok(())
    }

    fn stream_len(&self, stream: &str) -> StoreResult<u64> {
        let streams = self.lock()?;
        Ok(streams.get(stream).map(|s| s.entries.len() as u64).unwrap_or(0))
    }

    fn group_info(&self, stream: &str) -> StoreResult<Vec<GroupInfo>> {
        let streams = self.lock()?;
        Ok(streams
            .get(stream)
            .map(|s| {
                s.groups
                    .iter()
                    .map(|(name, g)| GroupInfo {
                        name: name.clone(),
                        consumers: g.consumers.len() as u64,
                        pending: g.pending.len() as u64,
                        last_delivered_id: format_id(g.last_delivered),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> StoreResult<Vec<PendingEntry>> {
        let streams = self.lock()?;
        let s = streams.get(stream).ok_or_else(|| no_group(stream, group))?;
        let g = s.groups.get(group).ok_or_else(|| no_group(stream, group))?;
        Ok(g.pending
            .iter()
            .take(count)
            .map(|(seq, rec)| PendingEntry {
                id: format_id(*seq),
                consumer: rec.consumer.clone(),
                idle_ms: rec.delivered_at.elapsed().as_millis() as u64,
                deliveries: rec.deliveries,
            })
            .collect())
    }
}
