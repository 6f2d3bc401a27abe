mod auth;
mod exercises;
mod health;
mod static_files;
mod topics;
mod users;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::auth::attach_identity;
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(exercises::router(state.clone()))
        .merge(topics::router(state.clone()))
        .merge(users::router())
        .merge(auth::router())
        .merge(static_files::router())
        .fallback(fallback_handler)
        .layer(middleware::from_fn(attach_identity))
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Not found").into_response()
}
