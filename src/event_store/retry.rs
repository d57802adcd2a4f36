//! Bounded retry for conflicting writes

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Attempts made before a conflict is reported to the caller
pub const MAX_ATTEMPTS: u32 = 3;

/// Run `operation`, retrying with linear backoff while it fails with a
/// retryable conflict. Each attempt must reload its state.
pub async fn retry_on_conflict<T, F, Fut>(name: &str, mut operation: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                tracing::warn!(
                    operation = name,
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    error = %e,
                    "Conflict, retrying"
                );
                tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
            }
            result => return result,
        }
    }
}
