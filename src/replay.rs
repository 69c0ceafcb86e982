//! Deadline-bounded retry for synthetic-input actions.
//!
//! Transient driver failures (focus stolen mid-click, input device busy)
//! are re-invoked until the deadline; every other error class fails fast.

use crate::error::Result;
use std::time::{Duration, Instant};
use tracing::warn;

/// How long an element action keeps retrying a failing driver call.
pub const REPLAY_DEADLINE: Duration = Duration::from_secs(30);
/// Pause between retry attempts.
pub const REPLAY_INTERVAL: Duration = Duration::from_millis(500);

/// Run `action`, re-invoking it on retryable errors until `deadline` has
/// elapsed. The last error is returned when the deadline runs out.
pub fn with_retry<T>(
    deadline: Duration,
    interval: Duration,
    mut action: impl FnMut() -> Result<T>,
) -> Result<T> {
    let started = Instant::now();
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && started.elapsed() < deadline => {
                warn!(error = %e, "retrying action after driver error");
                std::thread::sleep(interval);
            }
            Err(e) => return Err(e),
        }
    }
}
