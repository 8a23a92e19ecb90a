//! Bounded exponential backoff for tracker calls.
//!
//! Every tracker operation gets one initial attempt plus three retries
//! at 2 s, 4 s, and 8 s. Only transient failures are retried; anything
//! else, and anything still failing after the last attempt, propagates
//! to the caller and ends the run.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::TrackerError;

/// Delays between attempts; bounded so a run never hangs on the tracker.
const BACKOFF_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Run `call`, retrying transient failures on the bounded schedule.
pub async fn with_backoff<T, F, Fut>(operation: &str, mut call: F) -> Result<T, TrackerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TrackerError>>,
{
    for (attempt, delay) in BACKOFF_DELAYS.iter().enumerate() {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_s = delay.as_secs(),
                    error = %err,
                    "transient tracker failure, backing off"
                );
                tokio::time::sleep(*delay).await;
            }
            Err(err) => return Err(err),
        }
    }
    call().await
}
