//! Reconnecting WebSocket connection management.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns one link, reconnects after abnormal closure at a constant delay
//! - [`EventHandler`] / [`Callbacks`]: receive open, message, error and close callbacks
//! - [`Connector`]: opens a [`Link`]; [`WsConnector`] does so with `tokio-tungstenite`
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::new(endpoint, Config::default(), Callbacks::new()
//!     .with_open(|| tracing::info!("open"))
//!     .with_message(|payload| tracing::info!(%payload)))?;
//!
//! manager.connect();
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;
pub mod transport;

pub use connection::{ConnectionManager, Event};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
pub use transport::{CloseCode, CloseFrame, Inbound, Link, Outbound, WsConnector};
