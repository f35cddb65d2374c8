//! Middlewares for routes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;

use crate::config::Configuration;
use crate::deadline;
use crate::error::{Result, ServerError};
use crate::principal::PrincipalService;

const BEARER: &str = "Bearer ";
/// Client-requested budget, in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// Install the request deadline seen by every downstream call.
pub async fn deadline(
    State(config): State<Arc<Configuration>>,
    req: Request,
    next: Next,
) -> Response {
    let budget = req
        .headers()
        .get(REQUEST_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .map_or(config.request_timeout(), |asked| {
            asked.min(config.request_timeout())
        });

    deadline::scope(Instant::now() + budget, next.run(req)).await
}

/// Bearer authentication. Verified claims are stored in request
/// extensions.
pub async fn authenticate(
    State(service): State<PrincipalService>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|token| token.strip_prefix(BEARER).unwrap_or(token).trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServerError::unauthorized("Missing authorization token"))?;

    let claims = service.authenticate(token).await?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
