use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::db::operations::{users, UserStats};
use crate::response::{ok, AppError, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct SettingsRequest {
    #[serde(default)]
    last_topic_id: String,
}

#[derive(Debug, Serialize)]
struct UpdatedResponse {
    updated: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/user/stats", get(get_stats).post(update_stats))
        .route("/api/user/settings", post(update_settings))
}

fn require_identity(identity: Option<Extension<Identity>>) -> Result<Identity, AppError> {
    identity
        .map(|Extension(identity)| identity)
        .ok_or_else(|| AppError::unauthorized("Unauthorized"))
}

async fn get_stats(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
) -> Result<Json<SuccessResponse<UserStats>>, AppError> {
    let identity = require_identity(identity)?;
    let stats = users::get_user_stats(state.db_proxy(), &identity.user_id)
        .await
        .map_err(|e| AppError::internal(format!("Failed to get user stats: {e}")))?;
    Ok(ok(stats))
}

async fn update_stats(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(mut stats): Json<UserStats>,
) -> Result<Json<SuccessResponse<UpdatedResponse>>, AppError> {
    let identity = require_identity(identity)?;
    stats.user_id = identity.user_id;
    users::upsert_user_stats(state.db_proxy(), &stats)
        .await
        .map_err(|e| AppError::internal(format!("Failed to update user stats: {e}")))?;
    Ok(ok(UpdatedResponse { updated: true }))
}

async fn update_settings(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SuccessResponse<UpdatedResponse>>, AppError> {
    let identity = require_identity(identity)?;
    users::set_last_topic(state.db_proxy(), &identity.user_id, &req.last_topic_id)
        .await
        .map_err(|e| AppError::internal(format!("Failed to update user settings: {e}")))?;
    Ok(ok(UpdatedResponse { updated: true }))
}
