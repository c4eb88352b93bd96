//! Async pub/sub client.
//!
//! The composition root: one long-lived connection carries a subscription's
//! group reads and acknowledgments, while every publish opens its own
//! short-lived connection.

use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::{Error, Result};
use crate::message::{IntoFlow, Message};
use crate::publisher::Publisher;
use crate::subscriber::{self, ReadOptions};

/// An asynchronous publish/subscribe client.
///
/// # Examples
///
/// ```ignore
/// use ferrite_pubsub::{AsyncClient, Flow};
///
/// let mut client = AsyncClient::connect("redis://127.0.0.1:6379").await?;
/// client.publish("notifications", &serde_json::json!({"id": 1})).await?;
///
/// client
///     .subscribe("notifications", |msg| {
///         println!("{}: {:?}", msg.id(), msg.payload());
///         Flow::Stop
///     })
///     .await?;
/// ```
pub struct AsyncClient {
    conn: Connection,
    read_config: ConnectionConfig,
    publisher: Publisher,
    consumer: String,
    group: String,
    read_options: ReadOptions,
}

impl AsyncClient {
    /// Connect with default settings and a random consumer identity.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(url)).await
    }

    /// Connect with a fixed consumer identity.
    pub async fn connect_as(url: &str, consumer: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(url).with_consumer(consumer)).await
    }

    /// Connect using a full [`ClientConfig`].
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let read_config = config.read_connection()?;
        let conn = Connection::connect(&read_config).await?;
        let consumer = config.consumer_or_random();
        debug!(url = %config.url, consumer = %consumer, "connected");

        Ok(Self {
            conn,
            read_config,
            publisher: Publisher::new(config.publish_connection()?),
            consumer,
            read_options: config.read_options(),
            group: config.group,
        })
    }

    /// This client's consumer identity.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Group used by [`subscribe`](Self::subscribe).
    pub fn default_group(&self) -> &str {
        &self.group
    }

    /// Serialize `payload` to JSON and append it to `topic`, returning the entry id.
    pub async fn publish<P: Serialize + ?Sized>(&self, topic: &str, payload: &P) -> Result<String> {
        self.publisher.publish(topic, payload).await
    }

    /// Subscribe to `topic` in the default group until `handler` returns
    /// [`Flow::Stop`](crate::Flow::Stop).
    pub async fn subscribe<F, R>(&mut self, topic: &str, handler: F) -> Result<()>
    where
        F: FnMut(Message) -> R,
        R: IntoFlow,
    {
        let group = self.group.clone();
        self.subscribe_group(topic, &group, handler).await
    }

    /// Subscribe to `topic` as a member of `group`.
    ///
    /// Creates the group (positioned at the tail of the topic) if needed, then
    /// delivers each new entry to `handler` and acknowledges it. Returns once
    /// the handler signals stop, or with the first transport or handler error.
    ///
    /// If an earlier subscription left the read connection broken (for
    /// example after a reply timeout), a fresh one is opened first.
    pub async fn subscribe_group<F, R>(&mut self, topic: &str, group: &str, handler: F) -> Result<()>
    where
        F: FnMut(Message) -> R,
        R: IntoFlow,
    {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic must not be empty".into()));
        }
        if group.is_empty() {
            return Err(Error::InvalidArgument("group must not be empty".into()));
        }
        if self.conn.is_broken() {
            debug!(consumer = %self.consumer, "read connection broken, reconnecting");
            self.conn = Connection::connect(&self.read_config).await?;
        }
        subscriber::consume(
            &mut self.conn,
            topic,
            group,
            &self.consumer,
            &self.read_options,
            handler,
        )
        .await
    }
}
