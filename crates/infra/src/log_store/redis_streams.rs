//! Redis Streams-backed log store (durable, at-least-once delivery).
//!
//! Maps the [`LogStore`] boundary onto Redis commands:
//!
//! | Operation           | Command                                        |
//! |---------------------|------------------------------------------------|
//! | `append`            | `XADD <stream> * field value ...`              |
//! | `ensure_group`      | `XGROUP CREATE <stream> <group> <id> MKSTREAM` |
//! | `claim`             | `XREADGROUP ... STREAMS <stream> >`            |
//! | `claim_own_pending` | `XREADGROUP ... STREAMS <stream> 0`            |
//! | `ack`               | `XACK`                                         |
//! | `range`             | `XRANGE <stream> (<after> + COUNT n`           |
//! | `delete`            | `XDEL`                                         |
//! | `stream_len`        | `XLEN`                                         |
//! | `group_info`        | `XINFO GROUPS`                                 |
//! | `pending_detail`    | `XPENDING <stream> <group> - + n`              |
//!
//! Redis owns claim ownership, the pending-entry list and delivery counters.
//! Exclusive range starts (`(<id>`) need Redis 6.2 or newer.

use std::sync::Arc;
use std::time::Duration;

use redis::streams::{
    StreamId, StreamInfoGroupsReply, StreamPendingCountReply, StreamRangeReply, StreamReadReply,
};
use tracing::{debug, instrument};

use eventline_core::{EntryId, Fields, StreamEntry};
use eventline_events::{GroupInfo, GroupStart, LogStore, PendingEntry, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct RedisStreamsLogStore {
    client: Arc<redis::Client>,
}

impl RedisStreamsLogStore {
    /// Create a store for `redis_url` (e.g. "redis://localhost:6379").
    ///
    /// No connection is made until the first command.
    pub fn new(redis_url: impl AsRef<str>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(map_redis_error)?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn connection(&self) -> StoreResult<redis::Connection> {
        self.client.get_connection().map_err(map_redis_error)
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
        from: &str,
    ) -> StoreResult<Vec<StreamId>> {
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        // BLOCK 0 means "forever" to Redis; a zero wait omits BLOCK instead.
        if let Some(block) = block.filter(|b| !b.is_zero()) {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(stream).arg(from);

        // Nil reply = block timeout with nothing to deliver.
        let reply: Option<StreamReadReply> = cmd.query(&mut conn).map_err(map_redis_error)?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default())
    }
}

/// Classify a Redis error into the store taxonomy.
fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.code() == Some("BUSYGROUP") {
        return StoreError::GroupAlreadyExists(e.to_string());
    }

    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Transient(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

/// `XINFO` on an absent stream replies `ERR no such key` instead of an empty list.
fn is_missing_key(e: &redis::RedisError) -> bool {
    e.kind() == redis::ErrorKind::ResponseError
        && e.detail()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case("no such key"))
}

/// Convert a Redis stream entry into a [`StreamEntry`].
///
/// Values Redis hands back as non-strings are skipped.
fn to_entry(id: StreamId) -> StreamEntry {
    let fields: Fields = id
        .map
        .iter()
        .filter_map(|(k, v)| {
            redis::from_redis_value::<String>(v)
                .ok()
                .map(|s| (k.clone(), s))
        })
        .collect();

    StreamEntry::new(id.id, fields)
}

impl LogStore for RedisStreamsLogStore {
    #[instrument(skip(self, fields), err)]
    fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*"); // Auto-generate entry ID
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }

        let id: String = cmd.query(&mut conn).map_err(map_redis_error)?;
        Ok(EntryId::new(id))
    }

    #[instrument(skip(self), err)]
    fn ensure_group(&self, stream: &str, group: &str, start: GroupStart) -> StoreResult<()> {
        let mut conn = self.connection()?;

        let start_id = match start {
            GroupStart::Origin => "0",
            GroupStart::Latest => "$",
        };

        let created: StoreResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg(start_id)
            .arg("MKSTREAM")
            .query(&mut conn)
            .map_err(map_redis_error);

        match created {
            Ok(()) => Ok(()),
            Err(StoreError::GroupAlreadyExists(_)) => {
                debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>> {
        let ids = self.read_group(stream, group, consumer, count, Some(block), ">")?;
        Ok(ids.into_iter().map(to_entry).collect())
    }

    fn claim_own_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let ids = self.read_group(stream, group, consumer, count, None, "0")?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            // History of an entry that was XDEL'd while pending: no fields left.
            if id.map.is_empty() {
                debug!(stream, group, entry_id = %id.id, "releasing pending entry deleted from stream");
                self.ack(stream, group, &EntryId::new(id.id))?;
                continue;
            }
            entries.push(to_entry(id));
        }
        Ok(entries)
    }

    fn ack(&self, stream: &str, group: &str, id: &EntryId) -> StoreResult<()> {
        let mut conn = self.connection()?;

        let _: u64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id.as_str())
            .query(&mut conn)
            .map_err(map_redis_error)?;

        Ok(())
    }

    fn range(
        &self,
        stream: &str,
        after: Option<&EntryId>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut conn = self.connection()?;

        let start = after.map(|id| format!("({id}")).unwrap_or_else(|| "-".to_string());

        let reply: StreamRangeReply = redis::cmd("XRANGE")
            .arg(stream)
            .arg(start)
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query(&mut conn)
            .map_err(map_redis_error)?;

        Ok(reply.ids.into_iter().map(to_entry).collect())
    }

    fn delete(&self, stream: &str, id: &EntryId) -> StoreResult<()> {
        let mut conn = self.connection()?;

        let _: u64 = redis::cmd("XDEL")
            .arg(stream)
            .arg(id.as_str())
            .query(&mut conn)
            .map_err(map_redis_error)?;

        Ok(())
    }

    fn stream_len(&self, stream: &str) -> StoreResult<u64> {
        let mut conn = self.connection()?;

        redis::cmd("XLEN")
            .arg(stream)
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    fn group_info(&self, stream: &str) -> StoreResult<Vec<GroupInfo>> {
        let mut conn = self.connection()?;

        let reply: redis::RedisResult<StreamInfoGroupsReply> =
            redis::cmd("XINFO").arg("GROUPS").arg(stream).query(&mut conn);

        let reply = match reply {
            Ok(r) => r,
            Err(e) if is_missing_key(&e) => return Ok(vec![]),
            Err(e) => return Err(map_redis_error(e)),
        };

        Ok(reply
            .groups
            .into_iter()
            .map(|g| GroupInfo {
                name: g.name,
                consumers: g.consumers as u64,
                pending: g.pending as u64,
                last_delivered_id: EntryId::new(g.last_delivered_id),
            })
            .collect())
    }

    fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> StoreResult<Vec<PendingEntry>> {
        let mut conn = self.connection()?;

        let reply: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query(&mut conn)
            .map_err(map_redis_error)?;

        Ok(reply
            .ids
            .into_iter()
            .map(|p| PendingEntry {
                id: EntryId::new(p.id),
                consumer: p.consumer,
                idle_ms: p.last_delivered_ms as u64,
                deliveries: p.times_delivered as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_rejected_up_front() {
        assert!(RedisStreamsLogStore::new("not a url").is_err());
    }

    #[test]
    fn errors_are_classified() {
        let refused = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(map_redis_error(refused).is_transient());

        let wrong_type = redis::RedisError::from((redis::ErrorKind::TypeError, "bad reply"));
        assert!(matches!(map_redis_error(wrong_type), StoreError::Command(_)));
    }

    #[test]
    fn missing_key_is_recognised_by_kind_and_detail() {
        let missing = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "An error was signalled by the server",
            "no such key".to_string(),
        ));
        assert!(is_missing_key(&missing));

        let other = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "An error was signalled by the server",
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        ));
        assert!(!is_missing_key(&other));

        let io = redis::RedisError::from(std::io::Error::other("no such key"));
        assert!(!is_missing_key(&io));
    }

    #[test]
    fn entry_fields_are_read_as_strings() {
        let mut map = std::collections::HashMap::new();
        map.insert("type".to_string(), redis::Value::Data(b"\"test\"".to_vec()));
        map.insert("id".to_string(), redis::Value::Data(b"1".to_vec()));
        let id = StreamId {
            id: "1700000000000-0".to_string(),
            map,
        };

        let entry = to_entry(id);

        assert_eq!(entry.id, EntryId::from("1700000000000-0"));
        assert_eq!(entry.fields["type"], "\"test\"");
        assert_eq!(entry.fields["id"], "1");
    }
}
