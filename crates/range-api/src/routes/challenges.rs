//! User-facing surface: published challenge list, instance start/stop and
//! flag submission.

use axum::extract::{Path, State};
use axum::Json;

use crate::auth::Actor;
use crate::error::ApiError;
use crate::models::challenge::Challenge;
use crate::models::instance::Instance;
use crate::models::submission::SubmitFlagRequest;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::store;

/// GET /api/challenges
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Challenge>>>, ApiError> {
    let challenges = store::list_published_challenges(&state.db).await?;
    Ok(ApiResponse::ok(challenges))
}

/// POST /api/challenges/{id}/start
pub async fn start(
    State(state): State<AppState>,
    actor: Actor,
    Path(challenge_id): Path<String>,
) -> Result<Json<ApiResponse<Instance>>, ApiError> {
    let instance = state.instances.start(&actor.0, &challenge_id).await?;
    Ok(ApiResponse::ok_msg(
        "Instance started successfully",
        instance,
    ))
}

/// POST /api/challenges/{id}/stop
pub async fn stop(
    State(state): State<AppState>,
    actor: Actor,
    Path(challenge_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state.instances.stop(&actor.0, &challenge_id).await?;
    Ok(ApiResponse::ok_msg(
        "Instance stopped successfully",
        serde_json::json!({ "status": "stopped" }),
    ))
}

/// POST /api/submit
pub async fn submit(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<SubmitFlagRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if request.challenge_id.is_empty() || request.flag.is_empty() {
        return Err(ApiError::BadRequest("Invalid request format".to_string()));
    }

    let (correct, message) = state
        .instances
        .verify_flag(&actor.0, &request.challenge_id, &request.flag)
        .await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "correct": correct,
        "message": message,
    })))
}
