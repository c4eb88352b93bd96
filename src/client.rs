//! Synchronous (blocking) pub/sub client.
//!
//! This module wraps the async client in a dedicated Tokio runtime,
//! providing a blocking API for worker threads, scripts and non-async code.

use serde::Serialize;

use crate::async_client::AsyncClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::message::{IntoFlow, Message};

/// A blocking pub/sub client.
///
/// Internally owns a single-threaded Tokio runtime and delegates to
/// [`AsyncClient`]. `subscribe` occupies the calling thread until the
/// handler signals stop.
///
/// # Examples
///
/// ```ignore
/// use ferrite_pubsub::{Client, Flow};
///
/// let mut client = Client::connect("redis://127.0.0.1:6379")?;
/// client.subscribe("notifications", |msg| {
///     println!("{:?}", msg.payload());
///     Flow::Continue
/// })?;
/// ```
pub struct Client {
    inner: AsyncClient,
    rt: tokio::runtime::Runtime,
}

impl Client {
    /// Connect with default settings and a random consumer identity.
    pub fn connect(url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(url))
    }

    /// Connect with a fixed consumer identity.
    pub fn connect_as(url: &str, consumer: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(url).with_consumer(consumer))
    }

    /// Connect using a full [`ClientConfig`].
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;

        let inner = rt.block_on(AsyncClient::with_config(config))?;
        Ok(Self { inner, rt })
    }

    /// This client's consumer identity.
    pub fn consumer(&self) -> &str {
        self.inner.consumer()
    }

    /// Group used by [`subscribe`](Self::subscribe).
    pub fn default_group(&self) -> &str {
        self.inner.default_group()
    }

    /// Serialize `payload` to JSON and append it to `topic`, returning the entry id.
    pub fn publish<P: Serialize + ?Sized>(&self, topic: &str, payload: &P) -> Result<String> {
        self.rt.block_on(self.inner.publish(topic, payload))
    }

    /// Subscribe to `topic` in the default group, blocking until the handler stops.
    pub fn subscribe<F, R>(&mut self, topic: &str, handler: F) -> Result<()>
    where
        F: FnMut(Message) -> R,
        R: IntoFlow,
    {
        self.rt.block_on(self.inner.subscribe(topic, handler))
    }

    /// Subscribe to `topic` as a member of `group`, blocking until the handler stops.
    pub fn subscribe_group<F, R>(&mut self, topic: &str, group: &str, handler: F) -> Result<()>
    where
        F: FnMut(Message) -> R,
        R: IntoFlow,
    {
        self.rt
            .block_on(self.inner.subscribe_group(topic, group, handler))
    }
}
