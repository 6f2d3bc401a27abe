use axum::extract::{Path, State};
use axum::handler::Handler;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::operations::{PromptVersion, Topic};
use crate::middleware::auth::require_admin;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::topics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateTopicRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct UpdateTopicRequest {
    name: Option<String>,
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Serialize)]
struct TopicsResponse {
    topics: Vec<Topic>,
}

#[derive(Debug, Serialize)]
struct VersionsResponse {
    versions: Vec<PromptVersion>,
}

pub fn router(state: AppState) -> Router<AppState> {
    let admin = from_fn_with_state(state, require_admin);

    Router::new()
        .route(
            "/api/topics",
            get(list_topics).post(create_topic.layer(admin.clone())),
        )
        .route(
            "/api/topics/:id",
            get(get_topic)
                .put(update_topic.layer(admin.clone()))
                .delete(delete_topic.layer(admin.clone())),
        )
        .route("/api/versions/:topic_id", get(list_versions))
        .route(
            "/api/versions/:topic_id/restore/:version_id",
            post(restore_version.layer(admin)),
        )
}

async fn list_topics(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<TopicsResponse>>, AppError> {
    let topics = topics::list_topics(state.db_proxy()).await?;
    Ok(ok(TopicsResponse { topics }))
}

async fn create_topic(
    State(state): State<AppState>,
    Json(req): Json<CreateTopicRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<Topic>>), AppError> {
    let topic = topics::create_topic(state.db_proxy(), &req.name, &req.prompt).await?;
    Ok((StatusCode::CREATED, ok(topic)))
}

async fn get_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<Topic>>, AppError> {
    let topic = topics::get_topic(state.db_proxy(), &id).await?;
    Ok(ok(topic))
}

async fn update_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTopicRequest>,
) -> Result<Json<SuccessResponse<Topic>>, AppError> {
    let topic =
        topics::update_topic(state.db_proxy(), &id, req.name.as_deref(), &req.prompt).await?;
    Ok(ok(topic))
}

async fn delete_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    topics::delete_topic(state.db_proxy(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_versions(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Json<SuccessResponse<VersionsResponse>>, AppError> {
    let versions = topics::list_versions(state.db_proxy(), &topic_id).await?;
    Ok(ok(VersionsResponse { versions }))
}

async fn restore_version(
    State(state): State<AppState>,
    Path((topic_id, version_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<Topic>>, AppError> {
    let topic = topics::restore_version(state.db_proxy(), &topic_id, &version_id).await?;
    Ok(ok(topic))
}
