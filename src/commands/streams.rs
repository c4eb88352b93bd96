//! Stream command builders (XADD, XGROUP CREATE, XREADGROUP, XACK, XPENDING,
//! XLEN, DEL) and typed parsing of their replies.

use std::time::Duration;

use bytes::Bytes;

use crate::commands::{arg, exec};
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::types::{ToArg, Value};

/// Entry id that asks the server to generate one.
pub const AUTO_ID: &str = "*";

/// Group start position meaning "only entries appended after creation".
pub const NEW_ENTRIES_ONLY: &str = "$";

/// XREADGROUP id meaning "entries never delivered to any group member".
pub const UNDELIVERED: &str = ">";

/// One entry returned by a group read.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    /// Server-assigned entry id (e.g. `1700000000000-0`).
    pub id: String,
    /// Field/value pairs in wire order.
    pub fields: Vec<(Bytes, Bytes)>,
}

impl StreamEntry {
    /// Value of the first field named `name`.
    pub fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_ref() == name.as_bytes())
            .map(|(_, v)| v)
    }
}

/// Summary form of XPENDING for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSummary {
    /// Number of delivered but unacknowledged entries.
    pub count: u64,
    /// Smallest pending entry id.
    pub lowest: Option<String>,
    /// Largest pending entry id.
    pub highest: Option<String>,
    /// Pending count per consumer identity.
    pub consumers: Vec<(String, u64)>,
}

/// XADD key * field value [field value ...]: append one entry, returning its id.
pub async fn xadd<T: Transport + ?Sized>(
    conn: &mut T,
    key: impl ToArg,
    fields: &[(impl ToArg, impl ToArg)],
) -> Result<String> {
    if fields.is_empty() {
        return Err(Error::InvalidArgument("XADD needs at least one field".into()));
    }
    let mut args = vec![Bytes::from("XADD"), arg(key), Bytes::from(AUTO_ID)];
    for (f, v) in fields {
        args.push(f.to_arg());
        args.push(v.to_arg());
    }
    exec(conn, args).await?.into_string()
}

/// XGROUP CREATE key group start [MKSTREAM]: create a consumer group.
///
/// An already existing group comes back as a `BUSYGROUP` server error; see
/// [`Error::is_busy_group`].
pub async fn xgroup_create<T: Transport + ?Sized>(
    conn: &mut T,
    key: impl ToArg,
    group: impl ToArg,
    start: &str,
    mkstream: bool,
) -> Result<()> {
    let mut args = vec![
        Bytes::from("XGROUP"),
        Bytes::from("CREATE"),
        arg(key),
        arg(group),
        arg(start),
    ];
    if mkstream {
        args.push(Bytes::from("MKSTREAM"));
    }
    match exec(conn, args).await? {
        Value::Status(ref s) if s == "OK" => Ok(()),
        other => Err(Error::Protocol(format!(
            "unexpected XGROUP CREATE response: {}",
            other
        ))),
    }
}

/// XACK key group id [id ...]: acknowledge entries, returning how many were pending.
pub async fn xack<T: Transport + ?Sized>(
    conn: &mut T,
    key: impl ToArg,
    group: impl ToArg,
    ids: &[impl ToArg],
) -> Result<i64> {
    let mut args = vec![Bytes::from("XACK"), arg(key), arg(group)];
    for id in ids {
        args.push(id.to_arg());
    }
    exec(conn, args).await?.into_integer()
}

/// XLEN key: number of entries in a stream.
pub async fn xlen<T: Transport + ?Sized>(conn: &mut T, key: impl ToArg) -> Result<i64> {
    exec(conn, vec![Bytes::from("XLEN"), arg(key)])
        .await?
        .into_integer()
}

/// DEL key: drop a stream and all of its groups.
pub async fn del<T: Transport + ?Sized>(conn: &mut T, key: impl ToArg) -> Result<i64> {
    exec(conn, vec![Bytes::from("DEL"), arg(key)])
        .await?
        .into_integer()
}

/// XPENDING key group: summary of a group's pending entries.
pub async fn xpending_summary<T: Transport + ?Sized>(
    conn: &mut T,
    key: impl ToArg,
    group: impl ToArg,
) -> Result<PendingSummary> {
    let reply = exec(conn, vec![Bytes::from("XPENDING"), arg(key), arg(group)]).await?;
    parse_pending_summary(reply)
}

fn parse_pending_summary(reply: Value) -> Result<PendingSummary> {
    let mut parts = reply.into_array()?.into_iter();
    let count = match parts.next() {
        Some(v) => v.into_integer()?,
        None => return Ok(PendingSummary::default()),
    };
    let lowest = optional_string(parts.next())?;
    let highest = optional_string(parts.next())?;

    let mut consumers = Vec::new();
    if let Some(list) = parts.next() {
        for pair in list.into_array()? {
            let mut pair = pair.into_array()?.into_iter();
            let (Some(name), Some(n)) = (pair.next(), pair.next()) else {
                return Err(Error::Protocol("malformed XPENDING consumer entry".into()));
            };
            consumers.push((name.into_string()?, count_value(n)?));
        }
    }

    Ok(PendingSummary {
        count: count.max(0) as u64,
        lowest,
        highest,
        consumers,
    })
}

fn optional_string(value: Option<Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(v) => v.into_string().map(Some),
    }
}

/// Per-consumer counts arrive as bulk strings from Redis and integers from some servers.
fn count_value(value: Value) -> Result<u64> {
    match value {
        Value::Integer(n) => Ok(n.max(0) as u64),
        other => {
            let s = other.into_string()?;
            s.parse::<u64>()
                .map_err(|_| Error::Protocol(format!("invalid pending count: {}", s)))
        }
    }
}

// ── XREADGROUP with builder ─────────────────────────────────────────────────

/// Builder for XREADGROUP against a single stream.
///
/// # Example
/// ```ignore
/// let entries = XReadGroupCommand::new(&mut conn, "workers", "consumer-1a2b3c", "jobs")
///     .count(10)
///     .block(Duration::from_secs(5))
///     .execute()
///     .await?;
/// ```
pub struct XReadGroupCommand<'a, T: Transport + ?Sized> {
    conn: &'a mut T,
    group: Bytes,
    consumer: Bytes,
    key: Bytes,
    count: Option<usize>,
    block: Option<Duration>,
}

impl<'a, T: Transport + ?Sized> XReadGroupCommand<'a, T> {
    /// Read undelivered entries of `key` as `consumer` in `group`.
    pub fn new(
        conn: &'a mut T,
        group: impl ToArg,
        consumer: impl ToArg,
        key: impl ToArg,
    ) -> Self {
        Self {
            conn,
            group: arg(group),
            consumer: arg(consumer),
            key: arg(key),
            count: None,
            block: None,
        }
    }

    /// Limit the number of entries returned (COUNT).
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Block up to `timeout` waiting for entries (BLOCK, millisecond resolution).
    pub fn block(mut self, timeout: Duration) -> Self {
        self.block = Some(timeout);
        self
    }

    /// Build the argument vector without sending it.
    pub fn args(&self) -> Vec<Bytes> {
        let mut args = vec![
            Bytes::from("XREADGROUP"),
            Bytes::from("GROUP"),
            self.group.clone(),
            self.consumer.clone(),
        ];
        if let Some(count) = self.count {
            args.push(Bytes::from("COUNT"));
            args.push(arg(count));
        }
        if let Some(block) = self.block {
            args.push(Bytes::from("BLOCK"));
            args.push(arg(block.as_millis() as u64));
        }
        args.push(Bytes::from("STREAMS"));
        args.push(self.key.clone());
        args.push(Bytes::from(UNDELIVERED));
        args
    }

    /// Execute the read. A timed-out block yields an empty vector.
    pub async fn execute(self) -> Result<Vec<StreamEntry>> {
        let args = self.args();
        let reply = exec(self.conn, args).await?;
        parse_read_reply(reply, &self.key)
    }
}

/// Parse `[[key, [[id, [field, value, ...]], ...]], ...]`, keeping entries for `key`.
pub(crate) fn parse_read_reply(reply: Value, key: &[u8]) -> Result<Vec<StreamEntry>> {
    let mut entries = Vec::new();
    for stream in reply.into_array()? {
        let mut stream = stream.into_array()?.into_iter();
        let (Some(name), Some(items)) = (stream.next(), stream.next()) else {
            return Err(Error::Protocol("malformed XREADGROUP stream reply".into()));
        };
        if name.into_bytes()?.as_ref() != key {
            continue;
        }
        for item in items.into_array()? {
            entries.push(parse_entry(item)?);
        }
    }
    Ok(entries)
}

fn parse_entry(item: Value) -> Result<StreamEntry> {
    let mut parts = item.into_array()?.into_iter();
    let Some(id) = parts.next() else {
        return Err(Error::Protocol("stream entry without id".into()));
    };
    let id = id.into_string()?;

    // Entries deleted after delivery come back with a nil field list.
    let flat = parts.next().map(Value::into_array).transpose()?.unwrap_or_default();
    if flat.len() % 2 != 0 {
        return Err(Error::Protocol(format!(
            "odd number of field values in entry {}",
            id
        )));
    }

    let mut fields = Vec::with_capacity(flat.len() / 2);
    let mut flat = flat.into_iter();
    while let (Some(k), Some(v)) = (flat.next(), flat.next()) {
        fields.push((k.into_bytes()?, v.into_bytes()?));
    }
    Ok(StreamEntry { id, fields })
}
