//! Detached execution of work that must settle once started.

use std::future::Future;

use tracing::warn;

use crate::error::{Error, Result};

/// Drive `fut` on its own task and await its result.
///
/// Dropping the returned future does not cancel `fut`: it keeps running to
/// completion, so cleanup it owns (rollbacks, busy flags) still happens. A
/// panic inside `fut` is reported as `Error::Internal`.
pub async fn run_to_completion<T, F>(operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(e) => {
            warn!(op = operation, error = %e, "detached step did not complete");
            Err(Error::Internal(format!("{} did not complete: {}", operation, e)))
        }
    }
}
