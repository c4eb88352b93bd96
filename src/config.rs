//! Client configuration.
//!
//! Loaded from TOML with defaults for every key:
//!
//! ```toml
//! url = "redis://127.0.0.1:6379"
//! consumer = "billing-worker-1"   # random when omitted
//! group = "ferrite-pubsub"
//! block_ms = 5000
//! count = 32
//! read_timeout_ms = 10000
//! publish_timeout_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use rand::Rng;

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::subscriber::ReadOptions;

/// Consumer group used when `subscribe` is not given one.
pub const DEFAULT_GROUP: &str = "ferrite-pubsub";

/// Default log service address.
pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Configuration for [`AsyncClient`](crate::AsyncClient) and [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the log service.
    pub url: String,

    /// Consumer identity within a group. Generated when absent.
    pub consumer: Option<String>,

    /// Default consumer group.
    pub group: String,

    /// Bounded block duration of each group read, in milliseconds.
    pub block_ms: u64,

    /// Optional maximum number of entries per group read.
    pub count: Option<usize>,

    /// Reply timeout on the long-lived read connection, in milliseconds.
    pub read_timeout_ms: u64,

    /// Reply timeout on each publish connection, in milliseconds.
    pub publish_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            consumer: None,
            group: DEFAULT_GROUP.to_string(),
            block_ms: 5000,
            count: None,
            read_timeout_ms: 10_000,
            publish_timeout_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given address.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Use a fixed consumer identity.
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Use a different default group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Use a different block duration for group reads.
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block_ms = block.as_millis() as u64;
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::parse_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the loop misbehave.
    pub fn validate(&self) -> Result<()> {
        ConnectionConfig::from_url(&self.url)
            .map_err(|e| Error::Config(format!("invalid url: {}", e)))?;

        if self.group.is_empty() {
            return Err(Error::Config("group cannot be empty".to_string()));
        }
        if matches!(self.consumer.as_deref(), Some("")) {
            return Err(Error::Config("consumer cannot be empty".to_string()));
        }
        if self.block_ms == 0 {
            // BLOCK 0 means "forever" to the server.
            return Err(Error::Config("block_ms must be greater than 0".to_string()));
        }
        if self.count == Some(0) {
            return Err(Error::Config("count must be greater than 0".to_string()));
        }
        if self.read_timeout_ms <= self.block_ms {
            return Err(Error::Config(format!(
                "read_timeout_ms ({}) must exceed block_ms ({})",
                self.read_timeout_ms, self.block_ms
            )));
        }
        if self.publish_timeout_ms == 0 {
            return Err(Error::Config(
                "publish_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured consumer identity, or a freshly generated one.
    pub fn consumer_or_random(&self) -> String {
        self.consumer.clone().unwrap_or_else(random_consumer)
    }

    /// Group read settings.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            block: Duration::from_millis(self.block_ms),
            count: self.count,
        }
    }

    /// Connection settings for the long-lived read connection.
    pub fn read_connection(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig::from_url(&self.url)?
            .with_response_timeout(Duration::from_millis(self.read_timeout_ms)))
    }

    /// Connection settings for publish connections.
    pub fn publish_connection(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig::from_url(&self.url)?
            .with_response_timeout(Duration::from_millis(self.publish_timeout_ms)))
    }
}

/// `consumer-` followed by six random hex digits.
pub fn random_consumer() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("consumer-{:06x}", n)
}
