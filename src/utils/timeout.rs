//! Timing constants and async timeout helpers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// How long a peer may stay connected without announcing itself
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence of the peer maintenance sweep
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for dialing a peer
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for in-flight work during shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `future`, failing with `ProtocolError::Timeout` after `duration`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
