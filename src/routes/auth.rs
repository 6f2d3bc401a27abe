use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{cleared_session_cookie, session_cookie, AdminDecision, Identity, OAuthError};
use crate::db::operations::users;
use crate::response::{ok, AppError, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
struct AuthStatusResponse {
    logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct IsAdminResponse {
    is_admin: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/google/login", get(login))
        .route("/auth/google/callback", get(callback))
        .route("/auth/logout", get(logout))
        .route("/api/auth/status", get(status))
        .route("/api/auth/is_admin", get(is_admin))
}

async fn login(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let url = state
        .oauth()
        .authorize_url()
        .map_err(|_| AppError::service_unavailable("Google login is not configured"))?;
    Ok(Redirect::temporary(&url))
}

/// Completes the OAuth flow. Every failure ends on the start page without a session.
async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    match complete_login(&state, &query).await {
        Ok(user_id) => {
            tracing::info!(%user_id, "user signed in");
            match session_cookie(&user_id) {
                Some(cookie) => ([(SET_COOKIE, cookie)], Redirect::temporary("/")).into_response(),
                None => Redirect::temporary("/").into_response(),
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "google login failed");
            Redirect::temporary("/").into_response()
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LoginError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error("user lookup failed: {0}")]
    Store(#[from] sqlx::Error),
}

async fn complete_login(state: &AppState, query: &CallbackQuery) -> Result<String, LoginError> {
    let oauth = state.oauth();
    oauth.verify_state(&query.state)?;
    let profile = oauth.fetch_user(&query.code).await?;
    let user = users::get_or_create_user(state.db_proxy(), &profile.id).await?;
    Ok(user.id)
}

async fn logout() -> Response {
    ([(SET_COOKIE, cleared_session_cookie())], Redirect::temporary("/")).into_response()
}

async fn status(
    identity: Option<Extension<Identity>>,
) -> Json<SuccessResponse<AuthStatusResponse>> {
    let user_id = identity.map(|Extension(identity)| identity.user_id);
    ok(AuthStatusResponse {
        logged_in: user_id.is_some(),
        user_id,
    })
}

async fn is_admin(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
) -> Json<SuccessResponse<IsAdminResponse>> {
    let identity = identity.map(|Extension(identity)| identity);
    let decision = state
        .admin()
        .evaluate(state.db_proxy(), identity.as_ref())
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "admin lookup failed");
            AdminDecision::Denied
        });
    ok(IsAdminResponse {
        is_admin: decision == AdminDecision::Allowed,
    })
}
