//! Seams of the connection manager: how links are opened and who hears about them.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::WsError;
use super::transport::{CloseFrame, Link};

/// Opens a [`Link`] to an endpoint.
///
/// [`WsConnector`](super::WsConnector) is the production implementation; tests and
/// alternative transports supply their own.
///
/// # Example
///
/// ```ignore
/// struct Loopback;
///
/// #[async_trait]
/// impl Connector for Loopback {
///     async fn connect(&self, _endpoint: &str) -> Result<Link, WsError> {
///         let (tx, rx) = futures::channel::mpsc::unbounded();
///         Ok(Link::new(tx.sink_map_err(|_| WsError::ConnectionClosed), rx))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Link, WsError>;
}

/// Receives lifecycle callbacks from a [`ConnectionManager`](super::ConnectionManager).
///
/// Every method defaults to a no-op, so implementors only override what they care about.
/// All callbacks run on the manager's background task, one at a time and in order, and
/// must not block or panic.
pub trait EventHandler: Send + Sync + 'static {
    /// A link finished opening.
    fn on_open(&self) {}

    /// A text frame arrived, passed through verbatim.
    fn on_message(&self, _payload: &str) {}

    /// The transport reported an error. A close always follows when the link is lost.
    fn on_error(&self, _error: &WsError) {}

    /// A link closed. Any code other than 1000 arms a reconnect.
    fn on_close(&self, _frame: &CloseFrame) {}
}

impl EventHandler for () {}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn on_open(&self) {
        (**self).on_open();
    }

    fn on_message(&self, payload: &str) {
        (**self).on_message(payload);
    }

    fn on_error(&self, error: &WsError) {
        (**self).on_error(error);
    }

    fn on_close(&self, frame: &CloseFrame) {
        (**self).on_close(frame);
    }
}

type OpenFn = Box<dyn Fn() + Send + Sync>;
type MessageFn = Box<dyn Fn(&str) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&WsError) + Send + Sync>;
type CloseFn = Box<dyn Fn(&CloseFrame) + Send + Sync>;

/// Closure-based [`EventHandler`] where each callback is optional.
///
/// ```
/// use realtime_link::ws::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .with_open(|| println!("open"))
///     .with_message(|payload| println!("{payload}"));
/// # drop(callbacks);
/// ```
#[derive(Default)]
pub struct Callbacks {
    open: Option<OpenFn>,
    message: Option<MessageFn>,
    error: Option<ErrorFn>,
    close: Option<CloseFn>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_open<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_message<F: Fn(&str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_error<F: Fn(&WsError) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_close<F: Fn(&CloseFrame) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.close = Some(Box::new(f));
        self
    }
}

impl EventHandler for Callbacks {
    fn on_open(&self) {
        if let Some(f) = &self.open {
            f();
        }
    }

    fn on_message(&self, payload: &str) {
        if let Some(f) = &self.message {
            f(payload);
        }
    }

    fn on_error(&self, error: &WsError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn on_close(&self, frame: &CloseFrame) {
        if let Some(f) = &self.close {
            f(frame);
        }
    }
}
