use axum::extract::State;
use axum::handler::Handler;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::db::operations::ExercisePayload;
use crate::middleware::rate_limit::generate_rate_limit_middleware;
use crate::response::{ok, AppError, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TopicRequest {
    #[serde(default)]
    topic_id: String,
}

#[derive(Debug, Serialize)]
struct ExercisesResponse {
    exercises: Vec<ExercisePayload>,
}

#[derive(Debug, Serialize)]
struct LastRefinedPromptResponse {
    last_refined_prompt: String,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/exercises", post(get_exercises))
        .route(
            "/api/generate",
            post(generate.layer(from_fn_with_state(state, generate_rate_limit_middleware))),
        )
        .route("/api/last-refined-prompt", get(last_refined_prompt))
}

async fn get_exercises(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(req): Json<TopicRequest>,
) -> Result<Json<SuccessResponse<ExercisesResponse>>, AppError> {
    let topic_id = require_topic_id(&req)?;
    let user_id = identity.as_ref().map(|Extension(identity)| identity.user_id.as_str());

    let batch = state.engine().get_exercise_batch(topic_id, user_id).await?;
    if let Some(prompt) = batch.report.refined_prompt {
        state.refinements().record(prompt);
    }

    Ok(ok(ExercisesResponse {
        exercises: batch.exercises.into_iter().map(|e| e.payload).collect(),
    }))
}

/// Generates a fresh set for a topic without caching it.
async fn generate(
    State(state): State<AppState>,
    Json(req): Json<TopicRequest>,
) -> Result<Json<SuccessResponse<ExercisesResponse>>, AppError> {
    let topic_id = require_topic_id(&req)?;
    let preview = state.engine().preview_generation(topic_id).await?;
    if let Some(prompt) = preview.refined_prompt {
        state.refinements().record(prompt);
    }
    Ok(ok(ExercisesResponse {
        exercises: preview.exercises,
    }))
}

async fn last_refined_prompt(
    State(state): State<AppState>,
) -> Json<SuccessResponse<LastRefinedPromptResponse>> {
    ok(LastRefinedPromptResponse {
        last_refined_prompt: state.refinements().last().unwrap_or_default(),
    })
}

fn require_topic_id(req: &TopicRequest) -> Result<&str, AppError> {
    let topic_id = req.topic_id.trim();
    if topic_id.is_empty() {
        return Err(AppError::validation("topic_id is required"));
    }
    Ok(topic_id)
}
