//! Retry helper for background-job writes (analyzer, janitor). Request
//! handlers propagate storage errors directly instead, to keep request
//! latency bounded and predictable.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

const BACKOFF: Duration = Duration::from_millis(200);

/// Retries a transient storage failure once after a short backoff. Generic
/// over the error type so callers above the repository layer (which have
/// already folded `RepoError` into their own error type) can reuse it too.
pub async fn with_retry<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match op().await {
        Ok(v) => Ok(v),
        Err(_first_attempt) => {
            sleep(BACKOFF).await;
            op().await
        }
    }
}
