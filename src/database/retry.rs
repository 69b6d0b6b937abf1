use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Runs `op` up to `max_attempts` times while it fails with a transient
/// store error. Any other error, or the last transient one, is returned.
pub async fn with_retry<T, F, Fut>(label: &str, max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < max_attempts => {
                tracing::warn!(op = label, attempt, error = ?e, "transient store failure, retrying");
                tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
