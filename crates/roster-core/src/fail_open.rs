//! Fail-open utilities for graceful degradation
//!
//! Lifecycle notifications are fire-and-forget: a broken event sink must never
//! fail a thread.
//!
//! DO NOT use fail-open for:
//! - Model calls and catalog queries (business logic)
//! - Checkpoint commits (state)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open (infrastructure, not business logic)
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use roster_core::fail_open::fail_open;
/// use roster_core::Result;
///
/// async fn publish_event() -> Result<()> {
///     // Some operation that might fail
///     Ok(())
/// }
///
/// async fn example() {
///     let result = fail_open("event_sink", || publish_event()).await;
///     // result is None if publish_event() failed, otherwise Some(())
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RosterError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, RosterError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(RosterError::Other("test error".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }
}
