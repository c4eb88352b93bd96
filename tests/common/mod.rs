//! Shared test utilities for ferrite-pubsub integration tests.
//!
//! Spins up a small in-process RESP server that understands the stream
//! commands the client uses, so the tests need no external service.
//!
//! Import via `mod common;` in integration test files:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::Instant;

use ferrite_pubsub::commands::streams;
use ferrite_pubsub::resp::decode_value;
use ferrite_pubsub::{ClientConfig, Connection, ConnectionConfig, Value};

// ============================================================================
// Stream model
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    fn parse(raw: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(raw).ok()?;
        match s.split_once('-') {
            Some((ms, seq)) => Some(Self {
                ms: ms.parse().ok()?,
                seq: seq.parse().ok()?,
            }),
            None => Some(Self {
                ms: s.parse().ok()?,
                seq: 0,
            }),
        }
    }

    fn next_after(last: EntryId) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        if now > last.ms {
            Self { ms: now, seq: 0 }
        } else {
            Self {
                ms: last.ms,
                seq: last.seq + 1,
            }
        }
    }

    fn to_bytes(self) -> Bytes {
        Bytes::from(format!("{}-{}", self.ms, self.seq))
    }
}

#[derive(Default)]
struct GroupState {
    last_delivered: EntryId,
    /// Delivered but unacknowledged entry id -> consumer.
    pending: BTreeMap<EntryId, Bytes>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<(EntryId, Vec<Bytes>)>,
    last_id: EntryId,
    groups: HashMap<Bytes, GroupState>,
}

#[derive(Default)]
struct Shared {
    streams: Mutex<HashMap<Bytes, StreamState>>,
    appended: Notify,
}

enum Reply {
    Status(&'static str),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Nil,
    NilArray,
    Array(Vec<Reply>),
}

fn write_reply(reply: &Reply, out: &mut BytesMut) {
    match reply {
        Reply::Status(s) => out.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        Reply::Error(e) => out.extend_from_slice(format!("-{e}\r\n").as_bytes()),
        Reply::Integer(n) => out.extend_from_slice(format!(":{n}\r\n").as_bytes()),
        Reply::Bulk(b) => {
            out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
        Reply::NilArray => out.extend_from_slice(b"*-1\r\n"),
        Reply::Array(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                write_reply(item, out);
            }
        }
    }
}

fn wrong_args(cmd: &str) -> Reply {
    Reply::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd.to_ascii_lowercase()
    ))
}

fn no_group(key: &Bytes, group: &Bytes) -> Reply {
    Reply::Error(format!(
        "NOGROUP No such key '{}' or consumer group '{}'",
        String::from_utf8_lossy(key),
        String::from_utf8_lossy(group)
    ))
}

// ============================================================================
// Command handlers
// ============================================================================

async fn dispatch(args: Vec<Bytes>, shared: &Shared) -> Reply {
    let Some(name) = args.first() else {
        return Reply::Error("ERR empty command".into());
    };
    let cmd = String::from_utf8_lossy(name).to_ascii_uppercase();
    match cmd.as_str() {
        "PING" => Reply::Status("PONG"),
        "XADD" => xadd(&args, shared),
        "XGROUP" => xgroup(&args, shared),
        "XREADGROUP" => xreadgroup(&args, shared).await,
        "XACK" => xack(&args, shared),
        "XPENDING" => xpending(&args, shared),
        "XLEN" => xlen(&args, shared),
        "DEL" => del(&args, shared),
        _ => Reply::Error(format!("ERR unknown command '{}'", cmd)),
    }
}

fn xadd(args: &[Bytes], shared: &Shared) -> Reply {
    if args.len() < 5 || (args.len() - 3) % 2 != 0 {
        return wrong_args("XADD");
    }
    if args[2].as_ref() != b"*" {
        return Reply::Error("ERR only auto-generated ids are supported".into());
    }

    let mut streams = shared.streams.lock().unwrap();
    let stream = streams.entry(args[1].clone()).or_default();
    let id = EntryId::next_after(stream.last_id);
    stream.last_id = id;
    stream.entries.push((id, args[3..].to_vec()));
    drop(streams);

    shared.appended.notify_waiters();
    Reply::Bulk(id.to_bytes())
}

fn xgroup(args: &[Bytes], shared: &Shared) -> Reply {
    if args.len() < 5 || !args[1].eq_ignore_ascii_case(b"CREATE") {
        return Reply::Error("ERR only XGROUP CREATE is supported".into());
    }
    let (key, group, start) = (&args[2], &args[3], &args[4]);
    let mkstream = args
        .get(5)
        .is_some_and(|a| a.eq_ignore_ascii_case(b"MKSTREAM"));

    let mut streams = shared.streams.lock().unwrap();
    if !streams.contains_key(key) {
        if !mkstream {
            return Reply::Error(
                "ERR The XGROUP subcommand requires the key to exist. \
                 Note that for CREATE you may want to use the MKSTREAM option \
                 to create an empty stream automatically."
                    .into(),
            );
        }
        streams.insert(key.clone(), StreamState::default());
    }
    let Some(stream) = streams.get_mut(key) else {
        return Reply::Error("ERR no such key".into());
    };
    if stream.groups.contains_key(group) {
        return Reply::Error("BUSYGROUP Consumer Group name already exists".into());
    }

    let last_delivered = if start.as_ref() == b"$" {
        stream.last_id
    } else {
        match EntryId::parse(start) {
            Some(id) => id,
            None => return Reply::Error("ERR Invalid stream ID specified".into()),
        }
    };
    stream.groups.insert(
        group.clone(),
        GroupState {
            last_delivered,
            pending: BTreeMap::new(),
        },
    );
    Reply::Status("OK")
}

struct ReadRequest {
    group: Bytes,
    consumer: Bytes,
    count: Option<usize>,
    block: Option<u64>,
    key: Bytes,
}

fn parse_read_request(args: &[Bytes]) -> Result<ReadRequest, Reply> {
    if args.len() < 7 || !args[1].eq_ignore_ascii_case(b"GROUP") {
        return Err(wrong_args("XREADGROUP"));
    }
    let mut req = ReadRequest {
        group: args[2].clone(),
        consumer: args[3].clone(),
        count: None,
        block: None,
        key: Bytes::new(),
    };
    let number = |raw: Option<&Bytes>| -> Result<u64, Reply> {
        raw.and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Reply::Error("ERR value is not an integer or out of range".into()))
    };

    let mut i = 4;
    while i < args.len() {
        let opt = args[i].to_ascii_uppercase();
        match opt.as_slice() {
            b"COUNT" => {
                req.count = Some(number(args.get(i + 1))? as usize);
                i += 2;
            }
            b"BLOCK" => {
                req.block = Some(number(args.get(i + 1))?);
                i += 2;
            }
            b"NOACK" => i += 1,
            b"STREAMS" => {
                let (Some(key), Some(id)) = (args.get(i + 1), args.get(i + 2)) else {
                    return Err(wrong_args("XREADGROUP"));
                };
                if id.as_ref() != b">" {
                    return Err(Reply::Error("ERR only '>' reads are supported".into()));
                }
                req.key = key.clone();
                return Ok(req);
            }
            _ => return Err(Reply::Error("ERR syntax error".into())),
        }
    }
    Err(wrong_args("XREADGROUP"))
}

/// Deliver new entries to the consumer, or `None` when there are none yet.
fn try_deliver(req: &ReadRequest, shared: &Shared) -> Result<Option<Reply>, Reply> {
    let mut streams = shared.streams.lock().unwrap();
    let Some(stream) = streams.get_mut(&req.key) else {
        return Err(no_group(&req.key, &req.group));
    };
    let Some(group) = stream.groups.get_mut(&req.group) else {
        return Err(no_group(&req.key, &req.group));
    };

    let limit = req.count.unwrap_or(usize::MAX);
    let batch: Vec<_> = stream
        .entries
        .iter()
        .filter(|(id, _)| *id > group.last_delivered)
        .take(limit)
        .cloned()
        .collect();
    if batch.is_empty() {
        return Ok(None);
    }

    let mut entries = Vec::with_capacity(batch.len());
    for (id, fields) in batch {
        group.pending.insert(id, req.consumer.clone());
        group.last_delivered = id;
        entries.push(Reply::Array(vec![
            Reply::Bulk(id.to_bytes()),
            Reply::Array(fields.into_iter().map(Reply::Bulk).collect()),
        ]));
    }
    Ok(Some(Reply::Array(vec![Reply::Array(vec![
        Reply::Bulk(req.key.clone()),
        Reply::Array(entries),
    ])])))
}

async fn xreadgroup(args: &[Bytes], shared: &Shared) -> Reply {
    let req = match parse_read_request(args) {
        Ok(req) => req,
        Err(reply) => return reply,
    };
    let deadline = match req.block {
        Some(0) => None,
        Some(ms) => Some(Instant::now() + Duration::from_millis(ms)),
        None => {
            return match try_deliver(&req, shared) {
                Ok(Some(reply)) => reply,
                Ok(None) => Reply::NilArray,
                Err(reply) => reply,
            }
        }
    };

    loop {
        let appended = shared.appended.notified();
        tokio::pin!(appended);
        appended.as_mut().enable();

        match try_deliver(&req, shared) {
            Ok(Some(reply)) => return reply,
            Ok(None) => {}
            Err(reply) => return reply,
        }

        match deadline {
            Some(deadline) => {
                if tokio::time::timeout_at(deadline, appended).await.is_err() {
                    return Reply::NilArray;
                }
            }
            None => appended.await,
        }
    }
}

fn xack(args: &[Bytes], shared: &Shared) -> Reply {
    if args.len() < 4 {
        return wrong_args("XACK");
    }
    let mut streams = shared.streams.lock().unwrap();
    let Some(group) = streams
        .get_mut(&args[1])
        .and_then(|s| s.groups.get_mut(&args[2]))
    else {
        return Reply::Integer(0);
    };
    let acked = args[3..]
        .iter()
        .filter_map(|raw| EntryId::parse(raw))
        .filter(|id| group.pending.remove(id).is_some())
        .count();
    Reply::Integer(acked as i64)
}

fn xpending(args: &[Bytes], shared: &Shared) -> Reply {
    if args.len() != 3 {
        return Reply::Error("ERR only the XPENDING summary form is supported".into());
    }
    let streams = shared.streams.lock().unwrap();
    let Some(group) = streams.get(&args[1]).and_then(|s| s.groups.get(&args[2])) else {
        return no_group(&args[1], &args[2]);
    };

    let (Some(lowest), Some(highest)) = (
        group.pending.keys().next(),
        group.pending.keys().next_back(),
    ) else {
        return Reply::Array(vec![
            Reply::Integer(0),
            Reply::Nil,
            Reply::Nil,
            Reply::NilArray,
        ]);
    };

    let mut per_consumer: BTreeMap<Bytes, usize> = BTreeMap::new();
    for consumer in group.pending.values() {
        *per_consumer.entry(consumer.clone()).or_default() += 1;
    }
    Reply::Array(vec![
        Reply::Integer(group.pending.len() as i64),
        Reply::Bulk(lowest.to_bytes()),
        Reply::Bulk(highest.to_bytes()),
        Reply::Array(
            per_consumer
                .into_iter()
                .map(|(name, n)| {
                    Reply::Array(vec![Reply::Bulk(name), Reply::Bulk(Bytes::from(n.to_string()))])
                })
                .collect(),
        ),
    ])
}

fn xlen(args: &[Bytes], shared: &Shared) -> Reply {
    if args.len() != 2 {
        return wrong_args("XLEN");
    }
    let streams = shared.streams.lock().unwrap();
    Reply::Integer(streams.get(&args[1]).map_or(0, |s| s.entries.len()) as i64)
}

fn del(args: &[Bytes], shared: &Shared) -> Reply {
    if args.len() < 2 {
        return wrong_args("DEL");
    }
    let mut streams = shared.streams.lock().unwrap();
    let removed = args[1..]
        .iter()
        .filter(|key| streams.remove(*key).is_some())
        .count();
    Reply::Integer(removed as i64)
}

// ============================================================================
// Server helpers
// ============================================================================

fn command_args(value: Value) -> Option<Vec<Bytes>> {
    match value {
        Value::Array(items) => items.into_iter().map(|v| v.into_bytes().ok()).collect(),
        _ => None,
    }
}

async fn serve_connection(mut socket: TcpStream, shared: Arc<Shared>) {
    let mut buf = BytesMut::with_capacity(4096);
    let mut out = BytesMut::with_capacity(4096);
    loop {
        loop {
            match decode_value(&mut buf) {
                Ok(Some(value)) => {
                    let reply = match command_args(value) {
                        Some(args) => dispatch(args, &shared).await,
                        None => Reply::Error("ERR Protocol error: expected array of bulk strings".into()),
                    };
                    write_reply(&reply, &mut out);
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
        if !out.is_empty() {
            if socket.write_all(&out).await.is_err() {
                return;
            }
            out.clear();
        }
        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Start an in-process stream server on a random port and return the port number.
/// The server runs in a background tokio task.
#[allow(dead_code)]
pub async fn start_test_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let port = listener.local_addr().expect("should have local addr").port();
    let shared = Arc::new(Shared::default());

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_connection(socket, shared.clone()));
        }
    });
    port
}

/// Client configuration for a test server, with a short block so idle
/// polls come back quickly.
#[allow(dead_code)]
pub fn test_config(port: u16) -> ClientConfig {
    ClientConfig::new(format!("redis://127.0.0.1:{port}")).with_block(Duration::from_millis(100))
}

/// Open a plain connection to the test server.
#[allow(dead_code)]
pub async fn connect(port: u16) -> Connection {
    Connection::connect(&ConnectionConfig::from_addr("127.0.0.1", port))
        .await
        .expect("should connect to test server")
}

/// Number of delivered but unacknowledged entries in `group`.
#[allow(dead_code)]
pub async fn pending_count(port: u16, topic: &str, group: &str) -> u64 {
    let mut conn = connect(port).await;
    streams::xpending_summary(&mut conn, topic, group)
        .await
        .expect("XPENDING should succeed")
        .count
}

/// Poll until `group` exists on `topic`.
/// Panics if it does not appear within ~2.5 seconds.
#[allow(dead_code)]
pub async fn wait_for_group(port: u16, topic: &str, group: &str) {
    let mut conn = connect(port).await;
    for _ in 0..50 {
        if streams::xpending_summary(&mut conn, topic, group).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("group {group} was not created on {topic} within 2.5 seconds");
}

/// Append an entry with arbitrary fields, bypassing JSON encoding.
#[allow(dead_code)]
pub async fn append_raw(port: u16, topic: &str, fields: &[(&str, &str)]) -> String {
    let mut conn = connect(port).await;
    streams::xadd(&mut conn, topic, fields)
        .await
        .expect("XADD should succeed")
}

// ============================================================================
// Stalling server
// ============================================================================

fn single_entry_reply(topic: &Bytes, id: &str) -> Reply {
    Reply::Array(vec![Reply::Array(vec![
        Reply::Bulk(topic.clone()),
        Reply::Array(vec![Reply::Array(vec![
            Reply::Bulk(Bytes::from(id.to_string())),
            Reply::Array(vec![
                Reply::Bulk(Bytes::from_static(b"data")),
                Reply::Bulk(Bytes::from(format!(r#"{{"entry":"{id}"}}"#))),
            ]),
        ])]),
    ])])
}

async fn serve_stalling(mut socket: TcpStream, stalled: Arc<AtomicBool>, delay: Duration) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        while let Ok(Some(value)) = decode_value(&mut buf) {
            let Some(args) = command_args(value) else { return };
            let Some(name) = args.first() else { return };
            let cmd = String::from_utf8_lossy(name).to_ascii_uppercase();
            let reply = match cmd.as_str() {
                "XREADGROUP" => {
                    let topic = args.get(args.len().saturating_sub(2)).cloned().unwrap_or_default();
                    if !stalled.swap(true, Ordering::SeqCst) {
                        tokio::time::sleep(delay).await;
                        single_entry_reply(&topic, "1-0")
                    } else {
                        single_entry_reply(&topic, "2-0")
                    }
                }
                "XACK" => Reply::Integer(1),
                _ => Reply::Status("OK"),
            };
            let mut out = BytesMut::new();
            write_reply(&reply, &mut out);
            if socket.write_all(&out).await.is_err() {
                return;
            }
        }
        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Start a server whose very first XREADGROUP reply (entry `1-0`) arrives
/// only after `delay`; every later read answers at once with entry `2-0`.
/// Group creation and acks always succeed.
#[allow(dead_code)]
pub async fn start_stalling_server(delay: Duration) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let port = listener.local_addr().expect("should have local addr").port();
    let stalled = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_stalling(socket, stalled.clone(), delay));
        }
    });
    port
}
