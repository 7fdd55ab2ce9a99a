#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use super::envelope::{Envelope, parse_envelopes};
use crate::Result;
use crate::error::Error;
use crate::ws::{CloseFrame, EventHandler, WsError};

/// Routes envelopes to per-type subscribers and remembers the latest payload of each type.
///
/// Installed as the [`EventHandler`] of the feed's connection, so connection status is
/// derived from open/close callbacks rather than queried from the manager.
pub(crate) struct Router {
    channels: DashMap<String, broadcast::Sender<Value>>,
    latest: DashMap<String, Value>,
    connected: watch::Sender<bool>,
    capacity: usize,
}

impl Router {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            latest: DashMap::new(),
            connected: watch::Sender::new(false),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn dispatch(&self, envelope: Envelope) {
        // Holding the entry lock keeps a concurrent `receiver` from subscribing to a
        // channel that is about to be removed.
        if let Entry::Occupied(entry) = self.channels.entry(envelope.message_type.clone()) {
            if entry.get().receiver_count() == 0 {
                #[cfg(feature = "tracing")]
                tracing::debug!(message_type = %envelope.message_type, "Dropping channel without subscribers");
                entry.remove();
            } else {
                _ = entry.get().send(envelope.payload.clone());
            }
        }
        self.latest.insert(envelope.message_type, envelope.payload);
    }

    pub(crate) fn receiver(&self, message_type: &str) -> broadcast::Receiver<Value> {
        self.channels
            .entry(message_type.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub(crate) fn latest(&self, message_type: &str) -> Option<Value> {
        self.latest.get(message_type).map(|entry| entry.value().clone())
    }

    pub(crate) fn subscriber_count(&self, message_type: &str) -> usize {
        self.channels
            .get(message_type)
            .map_or(0, |tx| tx.receiver_count())
    }

    pub(crate) fn status(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub(crate) fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

impl EventHandler for Router {
    fn on_open(&self) {
        self.connected.send_replace(true);
    }

    fn on_message(&self, payload: &str) {
        match parse_envelopes(payload.as_bytes()) {
            Ok(envelopes) => {
                for envelope in envelopes {
                    self.dispatch(envelope);
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%payload, error = %e, "Skipping malformed envelope");
                #[cfg(not(feature = "tracing"))]
                let _: &Error = &e;
            }
        }
    }

    fn on_error(&self, error: &WsError) {
        #[cfg(feature = "tracing")]
        tracing::debug!(%error, "Feed transport error");
        #[cfg(not(feature = "tracing"))]
        let _ = error;
    }

    fn on_close(&self, _frame: &CloseFrame) {
        self.connected.send_replace(false);
    }
}

/// Stream of payloads of one type, deserialized to `T`.
///
/// A payload that does not deserialize yields an `Err` and the stream keeps going.
pub(crate) fn payload_stream<T>(
    mut rx: broadcast::Receiver<Value>,
) -> impl Stream<Item = Result<T>> + Send
where
    T: DeserializeOwned + Send + 'static,
{
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    yield serde_json::from_value::<T>(payload)
                        .map_err(|e| Error::from(WsError::MessageParse(e)));
                }
                Err(RecvError::Lagged(count)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Feed subscription lagged, missed {count} messages");
                    yield Err(Error::from(WsError::Lagged { count }));
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
