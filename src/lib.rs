//! # ferrite-pubsub: topic publish/subscribe over Ferrite streams
//!
//! A small publish/subscribe layer on top of the stream type of
//! [Ferrite](https://github.com/ferritelabs/ferrite) and other
//! Redis-compatible servers. Producers append JSON messages to a named
//! topic; consumers in a consumer group read them with at-least-once
//! delivery and explicit acknowledgment.
//!
//! ## How it works
//!
//! - **Publish**: `XADD <topic> * data <json>` on a short-lived connection
//! - **Subscribe**: `XGROUP CREATE ... $ MKSTREAM` once (an existing group
//!   is fine), then repeated `XREADGROUP ... BLOCK <ms> STREAMS <topic> >`
//! - **Acknowledge**: `XACK` after the handler returns, *before* honouring
//!   a stop, so the message that stops a subscription is never redelivered
//! - **Decode leniently**: payloads that are not JSON reach the handler
//!   as raw bytes instead of failing the loop
//!
//! ## Quick Start (async)
//!
//! ```ignore
//! use ferrite_pubsub::{AsyncClient, Flow};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> ferrite_pubsub::Result<()> {
//!     let mut client = AsyncClient::connect("redis://127.0.0.1:6379").await?;
//!
//!     client.publish("notifications", &json!({"id": 1, "type": "email"})).await?;
//!
//!     client
//!         .subscribe("notifications", |msg| {
//!             println!("{} -> {:?}", msg.id(), msg.payload());
//!             Flow::Stop
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Quick Start (blocking)
//!
//! ```ignore
//! use ferrite_pubsub::Client;
//!
//! fn main() -> ferrite_pubsub::Result<()> {
//!     let mut client = Client::connect("redis://127.0.0.1:6379")?;
//!     // A handler returning `()` never stops.
//!     client.subscribe("notifications", |msg| println!("{:?}", msg.payload()))?;
//!     Ok(())
//! }
//! ```

pub mod async_client;
pub mod client;
pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod group;
pub mod message;
pub mod publisher;
pub mod resp;
pub mod subscriber;
pub mod transport;
pub mod types;


// ── Re-exports for ergonomic top-level usage ────────────────────────────────

pub use async_client::AsyncClient;
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_GROUP};
pub use connection::{Connection, ConnectionConfig};
pub use error::{BoxError, Error, Result};
pub use message::{Flow, IntoFlow, Message, Payload};
pub use publisher::Publisher;
pub use subscriber::ReadOptions;
pub use transport::Transport;
pub use types::{ToArg, Value};
