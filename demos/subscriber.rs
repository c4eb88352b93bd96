//! Subscriber Example
//!
//! Joins the default consumer group on the `notifications` topic and prints
//! every message until interrupted. JSON payloads are pretty-printed; anything
//! else is shown as text.
//!
//! Run with: cargo run --example subscriber [config.toml]

use ferrite_pubsub::{AsyncClient, ClientConfig, Payload};

#[tokio::main]
async fn main() -> ferrite_pubsub::Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    let mut client = AsyncClient::with_config(config).await?;
    println!(
        "listening on notifications as {} in group {}",
        client.consumer(),
        client.default_group()
    );

    client
        .subscribe("notifications", |msg| match msg.payload() {
            Payload::Json(value) => println!(
                "[{}] {}",
                msg.id(),
                serde_json::to_string_pretty(value).unwrap_or_default()
            ),
            Payload::Raw(bytes) => println!("[{}] raw: {}", msg.id(), String::from_utf8_lossy(bytes)),
        })
        .await
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
