//! The consumption loop.
//!
//! A subscription moves through four states:
//!
//! ```text
//! Bootstrapping ──> AwaitingEntries ──> ProcessingBatch ──> Stopped
//!                     ^    │  (empty)        │
//!                     └────┘<────────────────┘ (batch exhausted)
//! ```
//!
//! Each entry of a batch is decoded, handed to the handler, and acknowledged
//! before the handler's [`Flow`] is looked at. A `Stop` therefore still acks
//! its own entry, while the rest of the batch stays pending in the group and
//! is redelivered later. A handler error aborts the loop before the ack.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::{self, DATA_FIELD};
use crate::commands::streams::{self, StreamEntry, XReadGroupCommand};
use crate::error::{Error, Result};
use crate::group::ensure_group;
use crate::message::{Flow, IntoFlow, Message, Payload};
use crate::transport::Transport;

/// Default upper bound for one blocking group read.
pub const DEFAULT_BLOCK: Duration = Duration::from_millis(5000);

/// How the loop polls the log service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Bounded block duration of each read; an empty poll is simply retried.
    pub block: Duration,
    /// Optional limit on entries per read.
    pub count: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            block: DEFAULT_BLOCK,
            count: None,
        }
    }
}

enum State {
    Bootstrapping,
    AwaitingEntries,
    ProcessingBatch(Vec<StreamEntry>),
    Stopped,
}

/// Run one subscription on `conn` until the handler asks to stop.
///
/// Returns `Ok(())` after a [`Flow::Stop`], or the first transport or
/// handler error.
pub async fn consume<T, F, R>(
    conn: &mut T,
    topic: &str,
    group: &str,
    consumer: &str,
    options: &ReadOptions,
    mut handler: F,
) -> Result<()>
where
    T: Transport + ?Sized,
    F: FnMut(Message) -> R,
    R: IntoFlow,
{
    let mut delivered: u64 = 0;
    let mut state = State::Bootstrapping;

    loop {
        state = match state {
            State::Bootstrapping => {
                ensure_group(conn, topic, group).await?;
                info!(topic, group, consumer, "subscription started");
                State::AwaitingEntries
            }
            State::AwaitingEntries => {
                let entries = read_batch(conn, topic, group, consumer, options).await?;
                if entries.is_empty() {
                    debug!(topic, group, "no new entries, polling again");
                    State::AwaitingEntries
                } else {
                    debug!(topic, group, count = entries.len(), "received entries");
                    State::ProcessingBatch(entries)
                }
            }
            State::ProcessingBatch(entries) => {
                let mut next = State::AwaitingEntries;
                for entry in entries {
                    let id = entry.id.clone();
                    let flow = handler(to_message(topic, entry))
                        .into_flow()
                        .map_err(Error::Handler)?;
                    streams::xack(conn, topic, group, &[id.as_str()]).await?;
                    delivered += 1;
                    debug!(topic, group, id = %id, "acknowledged");

                    if flow == Flow::Stop {
                        next = State::Stopped;
                        break;
                    }
                }
                next
            }
            State::Stopped => {
                info!(topic, group, consumer, delivered, "subscription stopped by handler");
                return Ok(());
            }
        };
    }
}

async fn read_batch<T: Transport + ?Sized>(
    conn: &mut T,
    topic: &str,
    group: &str,
    consumer: &str,
    options: &ReadOptions,
) -> Result<Vec<StreamEntry>> {
    let mut cmd = XReadGroupCommand::new(conn, group, consumer, topic).block(options.block);
    if let Some(count) = options.count {
        cmd = cmd.count(count);
    }
    cmd.execute().await
}

fn to_message(topic: &str, entry: StreamEntry) -> Message {
    let payload = match entry.field(DATA_FIELD) {
        Some(raw) => {
            let payload = codec::decode(raw);
            if matches!(payload, Payload::Raw(_)) {
                warn!(topic, id = %entry.id, "payload is not JSON, delivering raw bytes");
            }
            payload
        }
        None => {
            warn!(topic, id = %entry.id, "entry has no data field");
            Payload::Raw(bytes::Bytes::new())
        }
    };
    Message::new(topic, entry.id, payload)
}
