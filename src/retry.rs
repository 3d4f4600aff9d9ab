//! Bounded exponential-backoff wrapper for fallible async operations

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::errors::{Result, SyncError};

const BASE_INTERVAL: Duration = Duration::from_millis(100);

/// Run `operation` until it succeeds or `max_attempts` is reached.
///
/// Each failed attempt sleeps `BASE_INTERVAL + 2^attempt` milliseconds
/// before the next try. Once the ceiling is hit, the last error is
/// surfaced wrapped in [`SyncError::RetriesExceeded`].
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!("attempt {} failed: {}", attempt + 1, err);
                last_error = Some(err);
                let backoff = Duration::from_millis(1u64 << attempt.min(12));
                tokio::time::sleep(BASE_INTERVAL + backoff).await;
            }
        }
    }

    let source = last_error.unwrap_or_else(|| SyncError::Remote("no attempts were made".to_string()));
    Err(SyncError::RetriesExceeded {
        attempts: max_attempts,
        source: Box::new(source),
    })
}
