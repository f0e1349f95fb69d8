use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Runs `op` with exponential backoff until it succeeds or `attempts` is
/// exhausted, then returns the last error as a hard failure for this cycle.
///
/// The operation must be idempotent from the caller's perspective: each
/// retry repeats the same logical request.
///
/// # Errors
///
/// Returns the final attempt's error once all attempts fail.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    operation = label,
                    attempt,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                tracing::error!(
                    operation = label,
                    attempts,
                    error = %err,
                    "operation failed after all retries"
                );
                return Err(err);
            }
        }
    }
    unreachable!("retry loop always returns")
}
