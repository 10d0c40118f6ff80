//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default vault server for local development.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Timeout for establishing a TCP/TLS connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a complete request/response exchange. Not applied to the
/// event stream, which stays open indefinitely.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// First reconnect delay for the event stream.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delays never exceed this.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Capacity of the connection status broadcast.
pub const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Delay before reconnect attempt `attempt` (1-based): 1, 2, 4, 8, 16 s,
/// then 30 s from the sixth attempt on.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    RECONNECT_BASE_DELAY
        .saturating_mul(1u32 << exponent)
        .min(RECONNECT_MAX_DELAY)
}
