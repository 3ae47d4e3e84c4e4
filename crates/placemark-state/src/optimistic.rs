//! Apply / await / commit-or-revert helper for optimistic cache updates.

use std::future::Future;

use placemark_core::{Error, Result};

/// Run `effect` with an optimistic cache change around it.
///
/// `apply` changes the cache and returns the snapshot needed to undo it.
/// `effect` builds the remote call from that snapshot. On success `commit`
/// sees the effect's value; on failure `revert` receives the snapshot and
/// the error, and the error is returned unchanged.
pub async fn optimistic<S, T, A, E, F, C, R>(apply: A, effect: E, commit: C, revert: R) -> Result<T>
where
    A: FnOnce() -> S,
    E: FnOnce(&S) -> F,
    F: Future<Output = Result<T>>,
    C: FnOnce(&T),
    R: FnOnce(S, &Error),
{
    let snapshot = apply();
    match effect(&snapshot).await {
        Ok(value) => {
            commit(&value);
            Ok(value)
        }
        Err(e) => {
            revert(snapshot, &e);
            Err(e)
        }
    }
}
