//! TCP reachability polling.
//!
//! A container accepting connections on its forwarded port is the readiness
//! signal for every preset. Application-level readiness (e.g. a SQL server
//! able to run statements) is handled separately by [`crate::retry`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::ProbeError;

/// Pause between connection attempts.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation token backed by an `AtomicBool`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Try to connect to `addr` until it succeeds or `max_wait` elapses.
pub async fn await_reachable(addr: &str, max_wait: Duration) -> Result<(), ProbeError> {
    poll(addr, max_wait, None).await
}

/// Like [`await_reachable`], but gives up early once `cancel` is set.
pub async fn await_reachable_cancellable(
    addr: &str,
    max_wait: Duration,
    cancel: &CancelToken,
) -> Result<(), ProbeError> {
    poll(addr, max_wait, Some(cancel)).await
}

async fn poll(addr: &str, max_wait: Duration, cancel: Option<&CancelToken>) -> Result<(), ProbeError> {
    let deadline = Instant::now() + max_wait;
    let mut attempts = 0u32;

    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ProbeError::Cancelled {
                addr: addr.to_string(),
            });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        attempts += 1;
        // A single attempt may not outlive the overall deadline.
        match tokio::time::timeout(remaining, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                tracing::debug!("{} reachable after {} attempt(s)", addr, attempts);
                return Ok(());
            }
            Ok(Err(e)) => tracing::trace!("Connect to {} failed: {}", addr, e),
            Err(_) => tracing::trace!("Connect to {} timed out", addr),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(PROBE_INTERVAL.min(remaining)).await;
    }

    Err(ProbeError::Unreachable {
        addr: addr.to_string(),
        waited: max_wait,
    })
}
