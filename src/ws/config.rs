#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;

const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_EVENT_CAPACITY: usize = 1024;
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Configuration for connection manager behavior.
///
/// ```
/// use std::time::Duration;
///
/// use realtime_link::ws::config::Config;
///
/// let config = Config::builder()
///     .reconnect_delay(Duration::from_millis(1000))
///     .build();
/// assert_eq!(config.reconnect_delay, Duration::from_millis(1000));
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Delay between an abnormal close and the next connection attempt.
    /// The same delay is used for every attempt; retries never stop.
    #[builder(default = DEFAULT_RECONNECT_DELAY_DURATION)]
    pub reconnect_delay: Duration,
    /// Upper bound on a single connection attempt, after which it counts as failed
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub connect_timeout: Duration,
    /// Buffer size of the [`Event`](super::Event) broadcast channel
    #[builder(default = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
    /// Frames queued for the link writer before `send` starts dropping them
    #[builder(default = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY_DURATION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl Config {
    pub(crate) fn reconnect_backoff(&self) -> Constant {
        Constant::new(self.reconnect_delay)
    }
}
