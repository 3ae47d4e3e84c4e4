//! Bounded execution of a single step.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Run `fut` for at most `limit`.
///
/// On expiry the future is dropped and `Error::Timeout(operation)` is
/// returned, which displays as `{operation}-timeout`.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                op = operation,
                timeout_ms = limit.as_millis() as u64,
                "step timed out"
            );
            Err(Error::Timeout(operation.to_string()))
        }
    }
}
