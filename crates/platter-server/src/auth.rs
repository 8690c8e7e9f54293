use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{error::ApiError, AppState};

/// The raw `authorization` header value, if present and valid UTF-8.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Axum middleware that only lets requests with a live session token
/// through. Anything else gets `401` and the handler never runs.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match session_token(request.headers()) {
        Some(token) if state.sessions.is_valid(token) => next.run(request).await,
        Some(_) => {
            debug!(path = %request.uri().path(), "rejected unknown session token");
            ApiError::Unauthorized.into_response()
        }
        None => {
            debug!(path = %request.uri().path(), "rejected request without session token");
            ApiError::Unauthorized.into_response()
        }
    }
}
