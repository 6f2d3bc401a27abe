use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{identity_from_headers, AdminDecision};
use crate::response::json_error;
use crate::state::AppState;

/// Attaches the cookie identity, if any, as an `Identity` request extension.
pub async fn attach_identity(mut req: Request<Body>, next: Next) -> Response {
    if let Some(identity) = identity_from_headers(req.headers()) {
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}

pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = identity_from_headers(req.headers());
    let decision = state
        .admin()
        .evaluate(state.db_proxy(), identity.as_ref())
        .await;

    match decision {
        Ok(AdminDecision::Allowed) => next.run(req).await,
        Ok(AdminDecision::NotConfigured) => json_error(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Admin features are not configured",
        )
        .into_response(),
        Ok(AdminDecision::Anonymous) => json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "You must be logged in to perform this action",
        )
        .into_response(),
        Ok(AdminDecision::Denied) => json_error(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "You do not have permission to perform this action",
        )
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "admin check failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Could not verify user credentials",
            )
            .into_response()
        }
    }
}
