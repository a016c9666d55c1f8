//! Deadline and cancellation for remote model calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// Run a model call under a deadline, aborting early if `cancel` fires.
///
/// The future is dropped on timeout or cancellation, so an in-flight HTTP
/// request is abandoned rather than awaited.
pub(crate) async fn guarded<T, F>(
    deadline: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CoreError::Cancelled),
        outcome = tokio::time::timeout(deadline, call) => {
            outcome.map_err(|_| CoreError::Timeout(deadline))?
        }
    }
}
