use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Retry an async operation with exponential backoff. Transient read
/// failures against the document store get `attempts` tries total; the last
/// error is surfaced unchanged. Delay doubles after every failed attempt.
pub async fn with_backoff<T, E, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
