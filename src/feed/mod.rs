//! Typed live-data feed built on [`ConnectionManager`](crate::ws::ConnectionManager).
//!
//! The feed owns exactly one connection and layers envelope parsing on top of it:
//! inbound frames are `{ "type": ..., "payload": ... }` objects (or arrays of them), and
//! subscribers pick the types they care about.
//!
//! ```rust, no_run
//! use realtime_link::feed::LiveFeed;
//! use realtime_link::ws::config::Config;
//!
//! # async fn example() -> realtime_link::Result<()> {
//! let feed = LiveFeed::new("wss://example.com/realtime", Config::default())?;
//! feed.connect();
//! feed.send("subscribe", &["balance", "transaction"])?;
//!
//! if let Some(balance) = feed.latest("balance") {
//!     println!("{balance}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod envelope;
mod subscription;

pub use client::LiveFeed;
pub use envelope::{Envelope, parse_envelopes};
