//! Frame types and the default `tokio-tungstenite` [`Connector`].

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;

use super::error::WsError;
use super::traits::Connector;

/// Outbound half of a [`Link`].
pub type FrameSink = Pin<Box<dyn Sink<Outbound, Error = WsError> + Send>>;

/// Inbound half of a [`Link`].
pub type FrameStream = BoxStream<'static, Result<Inbound, WsError>>;

/// RFC 6455 close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Intentional, clean shutdown. The only code that does not trigger a reconnect.
    pub const NORMAL: Self = Self(1000);
    pub const GOING_AWAY: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Peer sent a close frame without a status.
    pub const NO_STATUS: Self = Self(1005);
    /// Link was lost without a close handshake.
    pub const ABNORMAL: Self = Self(1006);
    pub const INTERNAL_ERROR: Self = Self(1011);

    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_normal(self) -> bool {
        self.0 == Self::NORMAL.0
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Code and reason reported when a link closes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    pub fn new<C: Into<CloseCode>, S: Into<String>>(code: C, reason: S) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn normal<S: Into<String>>(reason: S) -> Self {
        Self::new(CloseCode::NORMAL, reason)
    }

    pub fn abnormal<S: Into<String>>(reason: S) -> Self {
        Self::new(CloseCode::ABNORMAL, reason)
    }

    #[must_use]
    pub fn no_status() -> Self {
        Self::new(CloseCode::NO_STATUS, String::new())
    }
}

/// Frame received from the peer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close(CloseFrame),
}

/// Frame sent to the peer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close(CloseFrame),
}

/// One live transport connection: a frame sink and a frame stream.
///
/// Ending the stream without an [`Inbound::Close`] counts as an abnormal closure.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Outbound, Error = WsError> + Send + 'static,
        St: Stream<Item = Result<Inbound, WsError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links with `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, WsError> {
        let (ws_stream, _) = connect_async(endpoint).await?;
        let (write, read) = ws_stream.split();

        let sink = write.with(|frame: Outbound| future::ready(Ok::<_, WsError>(to_message(frame))));
        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(message) => from_message(message).map(Ok),
                Err(e) => Some(Err(WsError::Connection(e))),
            })
        });

        Ok(Link::new(sink, stream))
    }
}

fn to_message(frame: Outbound) -> Message {
    match frame {
        Outbound::Text(text) => Message::Text(text.into()),
        Outbound::Close(close) => Message::Close(Some(WsCloseFrame {
            code: close.code.as_u16().into(),
            reason: close.reason.into(),
        })),
    }
}

fn from_message(message: Message) -> Option<Inbound> {
    match message {
        Message::Text(text) => Some(Inbound::Text(text.as_str().to_owned())),
        Message::Close(Some(close)) => Some(Inbound::Close(CloseFrame::new(
            u16::from(close.code),
            close.reason.as_str(),
        ))),
        Message::Close(None) => Some(Inbound::Close(CloseFrame::no_status())),
        // Ping/pong are answered by tungstenite; binary frames are not part of the feed.
        _ => None,
    }
}
