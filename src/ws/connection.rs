#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff as _, Constant};
use futures::future::BoxFuture;
use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Sleep, sleep, timeout};
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::traits::{Connector, EventHandler};
use super::transport::{CloseFrame, FrameSink, FrameStream, Inbound, Link, Outbound, WsConnector};
use crate::Result;
use crate::error::Error;

/// Lifecycle event, the broadcast form of the [`EventHandler`] callbacks.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    /// A link was established
    Open,
    /// Text frame received from the peer, verbatim
    Message(String),
    /// Transport-level failure; always followed by a [`Event::Close`]
    Error(Arc<WsError>),
    /// The link closed; any code other than 1000 schedules a reconnect
    Close(CloseFrame),
}

/// Where the background task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Idle,
    Connecting,
    Open,
    ReconnectScheduled,
}

enum Command {
    Connect,
    Disconnect,
    Send(String),
    SetReconnectDelay(Duration),
}

/// Keeps a best-effort connection to one streaming endpoint.
///
/// The manager is a cheap handle to a background task that owns the [`Link`] and the
/// reconnect timer. Every transition happens on that task, so callbacks never overlap.
///
/// - [`connect`](Self::connect) opens a link unless one is open or opening
/// - any close with a code other than 1000 arms exactly one reconnect after
///   [`Config::reconnect_delay`], retried forever at the same delay
/// - [`disconnect`](Self::disconnect) tears the link down and cancels a pending reconnect
/// - [`send`](Self::send) is fire-and-forget; frames sent while not open are dropped
///
/// Faults are reported to the [`EventHandler`] and to [`events`](Self::events)
/// subscribers, never returned from these methods.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(
///     "wss://example.com/stream",
///     Config::default(),
///     Callbacks::new().with_message(|payload| println!("{payload}")),
/// )?;
///
/// manager.connect();
/// manager.send(r#"{"type":"subscribe","payload":"balances"}"#);
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    endpoint: String,
    command_tx: mpsc::UnboundedSender<Command>,
    events_tx: broadcast::Sender<Event>,
}

impl ConnectionManager {
    /// Create a manager that opens links with [`WsConnector`].
    ///
    /// No network activity happens until [`connect`](Self::connect).
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new<H: EventHandler>(endpoint: &str, config: Config, handler: H) -> Result<Self> {
        Self::with_connector(endpoint, config, handler, WsConnector)
    }

    /// Create a manager that opens links with the given [`Connector`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_connector<H: EventHandler, C: Connector>(
        endpoint: &str,
        config: Config,
        handler: H,
        connector: C,
    ) -> Result<Self> {
        let endpoint = validate_endpoint(endpoint)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let driver = Driver::new(
            endpoint.clone(),
            &config,
            Box::new(handler),
            Arc::new(connector),
            events_tx.clone(),
        );
        tokio::spawn(driver.run(command_rx));

        Ok(Self {
            endpoint,
            command_tx,
            events_tx,
        })
    }

    /// Open a link if none is open or opening. A pending reconnect is replaced by an
    /// immediate attempt.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the link if present and cancel any pending reconnect. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Transmit `payload` verbatim if the link is open; otherwise log and drop it.
    pub fn send(&self, payload: &str) {
        self.command(Command::Send(payload.to_owned()));
    }

    /// Change the delay used the next time a reconnect is armed.
    pub fn set_reconnect_delay(&self, delay: Duration) {
        self.command(Command::SetReconnectDelay(delay));
    }

    /// Subscribe to lifecycle events.
    ///
    /// Each call returns a new independent receiver, so several owners can share one
    /// manager instead of opening parallel connections to the same stream.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn command(&self, command: Command) {
        // The task only stops once every handle is gone, so this cannot fail while `self` lives.
        _ = self.command_tx.send(command);
    }
}

fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url.into()),
        scheme => Err(Error::validation(format!(
            "endpoint scheme must be ws or wss, got {scheme}"
        ))),
    }
}

enum Phase {
    Idle,
    Connecting(BoxFuture<'static, std::result::Result<Link, WsError>>),
    Open(OpenLink),
}

enum LinkEvent {
    Attempt(std::result::Result<Link, WsError>),
    Frame(Option<std::result::Result<Inbound, WsError>>),
    WriteFailed(WsError),
}

/// How long a disconnected link may spend flushing its close frame before the writer is aborted.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// An established link whose sink is drained by its own writer task.
///
/// The driver only ever `try_send`s into the writer, so a peer that stops reading cannot
/// stall commands or the inbound stream.
struct OpenLink {
    outbound: mpsc::Sender<Outbound>,
    write_failed: mpsc::Receiver<WsError>,
    stream: FrameStream,
    writer: Option<JoinHandle<()>>,
}

impl OpenLink {
    fn spawn(link: Link, capacity: usize) -> Self {
        let Link { sink, stream } = link;
        let (outbound, outbound_rx) = mpsc::channel(capacity.max(1));
        let (failed_tx, write_failed) = mpsc::channel(1);
        let writer = tokio::spawn(write_frames(sink, outbound_rx, failed_tx));

        Self {
            outbound,
            write_failed,
            stream,
            writer: Some(writer),
        }
    }

    /// Queue a close frame, let the writer flush it, and give up after [`CLOSE_TIMEOUT`].
    fn close(mut self, frame: CloseFrame) {
        _ = self.outbound.try_send(Outbound::Close(frame));

        if let Some(writer) = self.writer.take() {
            let abort = writer.abort_handle();
            tokio::spawn(async move {
                if timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                    abort.abort();
                }
            });
        }
    }
}

impl Drop for OpenLink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn write_frames(
    mut sink: FrameSink,
    mut outbound: mpsc::Receiver<Outbound>,
    failed: mpsc::Sender<WsError>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(frame).await {
            _ = failed.try_send(e);
            return;
        }
    }
    _ = sink.close().await;
}

/// Owns the link and the reconnect timer; the only place state changes.
struct Driver {
    endpoint: String,
    connect_timeout: Duration,
    outbound_capacity: usize,
    backoff: Constant,
    connector: Arc<dyn Connector>,
    handler: Box<dyn EventHandler>,
    events_tx: broadcast::Sender<Event>,
    phase: Phase,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    fn new(
        endpoint: String,
        config: &Config,
        handler: Box<dyn EventHandler>,
        connector: Arc<dyn Connector>,
        events_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            endpoint,
            connect_timeout: config.connect_timeout,
            outbound_capacity: config.outbound_capacity,
            backoff: config.reconnect_backoff(),
            connector,
            handler,
            events_tx,
            phase: Phase::Idle,
            reconnect: None,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(endpoint = %self.endpoint, "All handles dropped, shutting down");
                        self.disconnect();
                        break;
                    }
                },
                event = next_link_event(&mut self.phase) => match event {
                    LinkEvent::Attempt(result) => self.handle_attempt(result),
                    LinkEvent::Frame(frame) => self.handle_frame(frame),
                    LinkEvent::WriteFailed(e) => self.lost(e),
                },
                () = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    if matches!(self.phase, Phase::Idle) {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(endpoint = %self.endpoint, "Reconnect timer fired");
                        self.start_attempt();
                    }
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Open(_) => ConnectionState::Open,
            Phase::Connecting(_) => ConnectionState::Connecting,
            Phase::Idle if self.reconnect.is_some() => ConnectionState::ReconnectScheduled,
            Phase::Idle => ConnectionState::Idle,
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Send(payload) => self.send(payload),
            Command::SetReconnectDelay(delay) => self.backoff = Constant::new(delay),
        }
    }

    fn connect(&mut self) {
        match self.state() {
            ConnectionState::Open | ConnectionState::Connecting => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    endpoint = %self.endpoint,
                    state = ?self.state(),
                    "connect() ignored, a connection is already open or opening"
                );
            }
            ConnectionState::ReconnectScheduled => {
                self.reconnect = None;
                self.start_attempt();
            }
            ConnectionState::Idle => self.start_attempt(),
        }
    }

    fn start_attempt(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "Connecting");

        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let limit = self.connect_timeout;

        self.phase = Phase::Connecting(Box::pin(async move {
            timeout(limit, connector.connect(&endpoint))
                .await
                .unwrap_or(Err(WsError::Timeout))
        }));
    }

    fn disconnect(&mut self) {
        self.reconnect = None;

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Open(link) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.endpoint, "Disconnecting");

                let frame = CloseFrame::normal("client disconnect");
                link.close(frame.clone());

                self.emit(Event::Close(frame));
            }
            Phase::Connecting(_) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.endpoint, "Abandoned in-flight connection attempt");
            }
            Phase::Idle => {}
        }
    }

    fn send(&mut self, payload: String) {
        let Phase::Open(link) = &mut self.phase else {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                endpoint = %self.endpoint,
                len = payload.len(),
                "send() while not connected, dropping payload"
            );
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(%payload, "Sending frame");

        match link.outbound.try_send(Outbound::Text(payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    endpoint = %self.endpoint,
                    "Outbound buffer full, peer is not reading, dropping payload"
                );
            }
            // The writer stopped on a sink error, which arrives as `LinkEvent::WriteFailed`
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn handle_attempt(&mut self, result: std::result::Result<Link, WsError>) {
        match result {
            Ok(link) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.endpoint, "Connected");

                self.phase = Phase::Open(OpenLink::spawn(link, self.outbound_capacity));
                self.reconnect = None;
                self.emit(Event::Open);
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Unable to connect");

                self.lost(e);
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<std::result::Result<Inbound, WsError>>) {
        match frame {
            Some(Ok(Inbound::Text(payload))) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%payload, "Received frame");

                self.emit(Event::Message(payload));
            }
            Some(Ok(Inbound::Close(close))) => self.closed(close),
            Some(Err(e)) => self.lost(e),
            None => self.closed(CloseFrame::abnormal("stream ended")),
        }
    }

    /// The link failed underneath us: report the error, then close abnormally.
    fn lost(&mut self, error: WsError) {
        let reason = error.to_string();
        self.phase = Phase::Idle;
        self.emit(Event::Error(Arc::new(error)));
        self.closed(CloseFrame::abnormal(reason));
    }

    fn closed(&mut self, frame: CloseFrame) {
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, code = %frame.code, reason = %frame.reason, "Connection closed");

        self.phase = Phase::Idle;
        let abnormal = !frame.code.is_normal();
        self.emit(Event::Close(frame));

        if abnormal {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!(endpoint = %self.endpoint, "Reconnect already scheduled");
            return;
        }

        let Some(delay) = self.backoff.next_backoff() else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, ?delay, "Scheduling reconnect");

        self.reconnect = Some(Box::pin(sleep(delay)));
    }

    fn emit(&self, event: Event) {
        match &event {
            Event::Open => self.handler.on_open(),
            Event::Message(payload) => self.handler.on_message(payload),
            Event::Error(error) => self.handler.on_error(error),
            Event::Close(frame) => self.handler.on_close(frame),
        }
        // No receivers is fine: the handler is the primary consumer.
        _ = self.events_tx.send(event);
    }
}

async fn next_link_event(phase: &mut Phase) -> LinkEvent {
    match phase {
        Phase::Idle => pending().await,
        Phase::Connecting(attempt) => LinkEvent::Attempt(attempt.await),
        Phase::Open(link) => tokio::select! {
            frame = link.stream.next() => LinkEvent::Frame(frame),
            Some(e) = link.write_failed.recv() => LinkEvent::WriteFailed(e),
        },
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
