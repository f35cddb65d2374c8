//! Per-request deadline shared with every downstream I/O call.

use std::future::Future;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::time::Instant;

use crate::error::{Result, ServerError};

/// Bound applied to I/O issued outside of a request scope.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

tokio::task_local! {
    static DEADLINE: Instant;
}

/// Run `fut` with `deadline` visible to every [`bounded`] call it makes.
pub async fn scope<F: Future>(deadline: Instant, fut: F) -> F::Output {
    DEADLINE.scope(deadline, fut).await
}

/// Deadline of the current request, if any.
pub fn current() -> Option<Instant> {
    DEADLINE.try_with(|deadline| *deadline).ok()
}

/// Await an I/O future, aborting once the caller's deadline is reached.
pub async fn bounded<T, E, F>(fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<ServerError>,
{
    let deadline =
        current().unwrap_or_else(|| Instant::now() + DEFAULT_IO_TIMEOUT);

    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!("downstream call aborted, deadline exceeded");
            Err(ServerError::http(
                StatusCode::REQUEST_TIMEOUT,
                "Request deadline exceeded",
            ))
        },
    }
}
