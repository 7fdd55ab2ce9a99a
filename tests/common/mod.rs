#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as link_channel;
use futures::{SinkExt as _, StreamExt as _};
use realtime_link::ws::config::Config;
use realtime_link::ws::{CloseFrame, Connector, Event, Inbound, Link, Outbound, WsError};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

pub const ENDPOINT: &str = "ws://feed.test/realtime";

/// How the next connection attempts behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Accept,
    Refuse,
    Hang,
}

/// Server side of one in-memory link.
pub struct Peer {
    /// When the client attempted this connection
    pub at: Instant,
    to_client: link_channel::UnboundedSender<Result<Inbound, WsError>>,
    from_client: link_channel::UnboundedReceiver<Outbound>,
}

impl Peer {
    pub fn push(&self, text: &str) {
        self.to_client
            .unbounded_send(Ok(Inbound::Text(text.to_owned())))
            .unwrap();
    }

    pub fn close(&self, code: u16, reason: &str) {
        self.to_client
            .unbounded_send(Ok(Inbound::Close(CloseFrame::new(code, reason))))
            .unwrap();
    }

    pub fn fail(&self, message: &str) {
        self.to_client
            .unbounded_send(Err(WsError::transport(message)))
            .unwrap();
    }

    /// Next frame the client sent, if any arrives within a second.
    pub async fn next_frame(&mut self) -> Option<Outbound> {
        tokio::time::timeout(Duration::from_secs(1), self.from_client.next())
            .await
            .ok()
            .flatten()
    }
}

/// [`Connector`] that hands every attempt to the test as a [`Peer`].
#[derive(Clone)]
pub struct MockConnector {
    mode: Arc<Mutex<Mode>>,
    attempts_tx: mpsc::UnboundedSender<Peer>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        let connector = Self {
            mode: Arc::new(Mutex::new(Mode::Accept)),
            attempts_tx,
        };
        (connector, attempts_rx)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Link, WsError> {
        let (to_client, client_rx) = link_channel::unbounded();
        let (client_tx, from_client) = link_channel::unbounded();
        let mode = *self.mode.lock().unwrap();

        _ = self.attempts_tx.send(Peer {
            at: Instant::now(),
            to_client,
            from_client,
        });

        match mode {
            Mode::Accept => Ok(Link::new(
                client_tx.sink_map_err(|_e| WsError::ConnectionClosed),
                client_rx,
            )),
            Mode::Refuse => Err(WsError::transport("connection refused")),
            Mode::Hang => pending().await,
        }
    }
}

pub fn config(reconnect_delay: Duration) -> Config {
    Config::builder().reconnect_delay(reconnect_delay).build()
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Next event, skipping nothing.
pub async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    events.recv().await.unwrap()
}

pub async fn expect_close(events: &mut broadcast::Receiver<Event>) -> CloseFrame {
    match next_event(events).await {
        Event::Close(frame) => frame,
        other => panic!("expected close, got {other:?}"),
    }
}
