//! Publisher Example
//!
//! Publishes five notifications to the `notifications` topic, one per second.
//! Start `subscriber` first: a new group only sees messages appended after
//! it was created.
//!
//! Run with: cargo run --example publisher [config.toml]
//!
//! Set `RUST_LOG=ferrite_pubsub=debug` to see every append.

use std::time::Duration;

use serde::Serialize;

use ferrite_pubsub::{AsyncClient, ClientConfig};

#[derive(Serialize)]
struct Notification<'a> {
    id: u32,
    kind: &'a str,
    message: String,
}

#[tokio::main]
async fn main() -> ferrite_pubsub::Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    let client = AsyncClient::with_config(config).await?;

    for id in 1..=5 {
        let notification = Notification {
            id,
            kind: "email",
            message: format!("Notification #{id}"),
        };
        let entry = client.publish("notifications", &notification).await?;
        println!("published notification {id} as {entry}");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
