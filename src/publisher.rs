//! Publishing: one JSON-encoded append per call.

use serde::Serialize;
use tracing::debug;

use crate::codec::{self, DATA_FIELD};
use crate::commands::streams;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Appends messages to topics, each call on its own short-lived connection.
///
/// Publishing never shares a connection with a subscription's blocking
/// reads. The connection opened for a call is closed when the call returns,
/// whether it succeeded or not.
#[derive(Debug, Clone)]
pub struct Publisher {
    config: ConnectionConfig,
}

impl Publisher {
    /// Create a publisher that connects with `config` on every call.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Serialize `payload` to JSON and append it to `topic`.
    ///
    /// Creates the topic if it does not exist yet. Returns the entry id the
    /// log service assigned. There is no retry.
    pub async fn publish<P: Serialize + ?Sized>(&self, topic: &str, payload: &P) -> Result<String> {
        let data = codec::encode(payload)?;
        let mut conn = Connection::connect(&self.config).await?;
        append(&mut conn, topic, &data).await
    }
}

/// Append already-encoded `data` to `topic` as a single `data` field.
pub async fn append<T: Transport + ?Sized>(conn: &mut T, topic: &str, data: &str) -> Result<String> {
    if topic.is_empty() {
        return Err(Error::InvalidArgument("topic must not be empty".into()));
    }
    let id = streams::xadd(conn, topic, &[(DATA_FIELD, data)]).await?;
    debug!(topic, id = %id, bytes = data.len(), "published");
    Ok(id)
}
