//! Admin authentication middleware.
//!
//! Admin routes require `Authorization: Bearer <token>` when a token is
//! configured. Without a configured token every request is let through.

use crate::{errors::Error, server::SharedState};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Rejects admin requests that do not carry the configured bearer token.
pub async fn require_admin(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    if presented == Some(expected) {
        next.run(req).await
    } else {
        warn!("Rejected admin request to {}", req.uri().path());
        Error::Unauthorized.into_response()
    }
}
