use std::sync::Arc;

use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use super::envelope::OutgoingEnvelope;
use super::subscription::{Router, payload_stream};
use crate::Result;
use crate::ws::config::Config;
use crate::ws::{ConnectionManager, Connector, WsConnector};

/// Typed live-data feed over a single reconnecting connection.
///
/// Frames are JSON envelopes tagged with a `type`. The feed fans payloads out per type,
/// keeps the most recent payload of each type for synchronous reads, and tracks whether
/// the connection is currently up.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use realtime_link::feed::LiveFeed;
/// use realtime_link::ws::config::Config;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Balance {
///     account: String,
///     amount: String,
/// }
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let feed = LiveFeed::new("wss://example.com/realtime", Config::default())?;
///     let mut balances = Box::pin(feed.subscribe::<Balance>("balance"));
///
///     feed.connect();
///
///     while let Some(balance) = balances.next().await {
///         println!("{:?}", balance?);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct LiveFeed {
    connection: ConnectionManager,
    router: Arc<Router>,
}

impl LiveFeed {
    /// Create a feed backed by a [`WsConnector`]. Nothing connects until [`connect`](Self::connect).
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_connector(endpoint, config, WsConnector)
    }

    /// Create a feed whose links are opened by `connector`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_connector<C: Connector>(endpoint: &str, config: Config, connector: C) -> Result<Self> {
        let router = Arc::new(Router::new(config.event_capacity));
        let connection =
            ConnectionManager::with_connector(endpoint, config, Arc::clone(&router), connector)?;

        Ok(Self { connection, router })
    }

    pub fn connect(&self) {
        self.connection.connect();
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Serialize `payload` into an envelope of `message_type` and send it.
    ///
    /// Only serialization can fail; delivery follows [`ConnectionManager::send`], so the
    /// frame is dropped if the connection is down.
    pub fn send<P: Serialize>(&self, message_type: &str, payload: &P) -> Result<()> {
        let text = serde_json::to_string(&OutgoingEnvelope {
            message_type,
            payload,
        })?;
        self.connection.send(&text);
        Ok(())
    }

    /// Stream payloads of `message_type`, deserialized to `T`.
    ///
    /// Only payloads that arrive after this call are delivered; use [`latest`](Self::latest)
    /// for the current value.
    pub fn subscribe<T>(&self, message_type: &str) -> impl Stream<Item = Result<T>> + Send + use<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        payload_stream(self.router.receiver(message_type))
    }

    /// Most recent payload received for `message_type`, across reconnects.
    #[must_use]
    pub fn latest(&self, message_type: &str) -> Option<Value> {
        self.router.latest(message_type)
    }

    /// Most recent payload for `message_type`, deserialized to `T`.
    pub fn latest_as<T: DeserializeOwned>(&self, message_type: &str) -> Result<Option<T>> {
        self.latest(message_type)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Whether the last lifecycle callback was an open rather than a close.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.router.is_connected()
    }

    /// Receiver notified on every open (`true`) and close (`false`).
    #[must_use]
    pub fn connection_status(&self) -> watch::Receiver<bool> {
        self.router.status()
    }

    /// Number of live streams for `message_type`.
    #[must_use]
    pub fn subscriber_count(&self, message_type: &str) -> usize {
        self.router.subscriber_count(message_type)
    }

    /// The underlying connection, for raw frames and lifecycle events.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
