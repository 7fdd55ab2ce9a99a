//! Live feed explorer.
//!
//! Connects to a realtime endpoint, subscribes to a message type, and logs payloads and
//! connection status changes. Kill the server while it runs to watch the reconnect loop.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example live_feed -- ws://127.0.0.1:9001 balance
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use realtime_link::feed::LiveFeed;
use realtime_link::ws::config::Config;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ENDPOINT_VAR: &str = "REALTIME_ENDPOINT";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .or_else(|| std::env::var(ENDPOINT_VAR).ok())
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_owned());
    let message_type = args.next().unwrap_or_else(|| "balance".to_owned());

    let config = Config::builder()
        .reconnect_delay(Duration::from_secs(2))
        .build();
    let feed = LiveFeed::new(&endpoint, config)?;

    // Frames sent while the link is down are dropped, so (re)subscribe on every open.
    let mut status = feed.connection_status();
    let resubscriber = feed.clone();
    let topic = message_type.clone();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let connected = *status.borrow_and_update();
            info!(stream = "status", connected);
            if connected && let Err(e) = resubscriber.send("subscribe", &[topic.as_str()]) {
                warn!(stream = "status", error = %e, "Unable to subscribe");
            }
        }
    });

    let mut payloads = Box::pin(feed.subscribe::<Value>(&message_type));
    feed.connect();

    info!(%endpoint, %message_type, "Waiting for payloads");

    let mut count = 0_usize;
    while let Ok(Some(result)) = timeout(Duration::from_secs(30), payloads.next()).await {
        match result {
            Ok(payload) => {
                count += 1;
                info!(stream = %message_type, %payload);
            }
            Err(e) => warn!(stream = %message_type, error = %e),
        }
        if count >= 20 {
            break;
        }
    }

    info!(received = count, latest = ?feed.latest(&message_type));
    feed.disconnect();

    Ok(())
}
