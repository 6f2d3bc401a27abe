use std::path::PathBuf;

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::response::json_error;
use crate::state::AppState;

const LONG_CACHE: &str = "public, max-age=31536000";
const SCRIPT_MARKER: &str = "app.js?v=";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/app.js", get(app_js))
        .route("/privacy.html", get(privacy))
        .route("/favicon.svg", get(favicon))
        .route("/favicon-32x32.svg", get(favicon_32))
        .route("/favicon.ico", get(favicon_ico))
}

async fn index(State(state): State<AppState>) -> Response {
    let Some(html) = read_text(&state, "index.html").await else {
        return not_found("File not found");
    };
    let html = bust_script_cache(&html, chrono::Utc::now().timestamp());
    (
        [
            (CONTENT_TYPE, "text/html; charset=utf-8"),
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (PRAGMA, "no-cache"),
            (EXPIRES, "0"),
        ],
        html,
    )
        .into_response()
}

async fn app_js(State(state): State<AppState>) -> Response {
    serve_cached(&state, "app.js", "application/javascript").await
}

async fn privacy(State(state): State<AppState>) -> Response {
    serve_cached(&state, "privacy.html", "text/html; charset=utf-8").await
}

async fn favicon(State(state): State<AppState>) -> Response {
    serve_cached(&state, "favicon.svg", "image/svg+xml").await
}

async fn favicon_32(State(state): State<AppState>) -> Response {
    serve_cached(&state, "favicon-32x32.svg", "image/svg+xml").await
}

async fn favicon_ico() -> Redirect {
    Redirect::permanent("/favicon.svg")
}

async fn serve_cached(state: &AppState, name: &str, content_type: &'static str) -> Response {
    match tokio::fs::read(static_path(state, name)).await {
        Ok(bytes) => {
            ([(CONTENT_TYPE, content_type), (CACHE_CONTROL, LONG_CACHE)], bytes).into_response()
        }
        Err(_) => not_found("File not found"),
    }
}

async fn read_text(state: &AppState, name: &str) -> Option<String> {
    tokio::fs::read_to_string(static_path(state, name)).await.ok()
}

fn static_path(state: &AppState, name: &str) -> PathBuf {
    state.config().static_dir.join(name)
}

fn not_found(message: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message).into_response()
}

/// Replaces every `app.js?v=<token>` version token with `version`.
pub fn bust_script_cache(html: &str, version: i64) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find(SCRIPT_MARKER) {
        let after = pos + SCRIPT_MARKER.len();
        out.push_str(&rest[..after]);
        out.push_str(&version.to_string());
        let tail = &rest[after..];
        let token_len = tail
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(tail.len());
        rest = &tail[token_len..];
    }
    out.push_str(rest);
    out
}
