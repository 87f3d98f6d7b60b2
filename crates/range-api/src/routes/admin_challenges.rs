//! Operator challenge management: paged list with filters, CRUD and
//! publish/unpublish.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::challenge::{
    Challenge, ChallengeAdminView, ChallengeRequest, ChallengeStatusRequest,
};
use crate::routes::{normalize_paging, paged, ApiResponse};
use crate::state::AppState;
use crate::store::{self, ChallengeFilter};

#[derive(Debug, Deserialize)]
pub struct ChallengeListQuery {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    /// Title substring search.
    pub search: Option<String>,
    #[serde(default = "crate::routes::default_page")]
    pub page: i64,
    #[serde(default = "crate::routes::default_page_size", rename = "pageSize")]
    pub page_size: i64,
}

/// GET /api/admin/challenges
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ChallengeListQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let filter = ChallengeFilter {
        category: query.category.filter(|v| !v.is_empty()),
        difficulty: query.difficulty.filter(|v| !v.is_empty()),
        status: query.status.filter(|v| !v.is_empty()),
        search: query.search.filter(|v| !v.is_empty()),
    };
    let (page, page_size) = normalize_paging(query.page, query.page_size);
    let (challenges, total) = store::list_challenges(&state.db, &filter, page, page_size).await?;

    let list: Vec<ChallengeAdminView> =
        challenges.into_iter().map(ChallengeAdminView::from).collect();
    Ok(ApiResponse::ok(paged(list, total, page, page_size)))
}

/// GET /api/admin/challenges/{id}
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ChallengeAdminView>>, ApiError> {
    let challenge = store::get_challenge(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("题目不存在".to_string()))?;
    Ok(ApiResponse::ok(ChallengeAdminView::from(challenge)))
}

/// Resolve the short image name from a linked image row, when one is set.
async fn resolve_image_name(
    state: &AppState,
    request: &ChallengeRequest,
) -> Result<String, ApiError> {
    if !request.image_id.is_empty() {
        if let Some(image) = store::get_image(&state.db, &request.image_id).await? {
            return Ok(image.short_name());
        }
    }
    Ok(request.image.clone())
}

/// POST /api/admin/challenges
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ApiResponse<ChallengeAdminView>>, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;
    if request.flag.is_empty() {
        return Err(ApiError::BadRequest("Flag 不能为空".to_string()));
    }
    if request.image.is_empty() && request.image_id.is_empty() {
        return Err(ApiError::BadRequest("必须指定镜像或镜像ID".to_string()));
    }

    let image = resolve_image_name(&state, &request).await?;
    let status = if request.status.is_empty() {
        "unpublished".to_string()
    } else {
        request.status.clone()
    };

    let now = Utc::now();
    let challenge = Challenge {
        id: Uuid::new_v4().to_string(),
        title: request.title,
        description: request.description_html,
        hint: request.hint_html,
        category: request.category,
        difficulty: request.difficulty,
        image,
        image_id: request.image_id,
        docker_host_id: request.docker_host_id,
        port: request.port,
        memory_limit: request.memory_limit,
        cpu_limit: request.cpu_limit,
        privileged: request.privileged,
        flag: request.flag,
        points: request.points,
        status,
        published_at: None,
        unpublished_at: None,
        created_at: now,
        updated_at: now,
    };
    store::insert_challenge(&state.db, &challenge).await?;

    tracing::info!(id = %challenge.id, title = %challenge.title, "Challenge created");
    Ok(ApiResponse::ok_msg(
        "Challenge created successfully",
        ChallengeAdminView::from(challenge),
    ))
}

/// PUT /api/admin/challenges/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;

    let existing = store::get_challenge(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("题目不存在".to_string()))?;

    let mut image = resolve_image_name(&state, &request).await?;
    if image.is_empty() {
        // A full update may omit the short name; keep the stored one rather
        // than blanking a required field.
        if !existing.image.is_empty() {
            image = existing.image.clone();
        } else {
            return Err(ApiError::BadRequest("镜像名称不能为空".to_string()));
        }
    }

    let status = if request.status.is_empty() {
        existing.status.clone()
    } else {
        request.status.clone()
    };
    let flag = if request.flag.is_empty() {
        existing.flag.clone()
    } else {
        request.flag.clone()
    };

    let updated = Challenge {
        id: existing.id.clone(),
        title: request.title,
        description: request.description_html,
        hint: request.hint_html,
        category: request.category,
        difficulty: request.difficulty,
        image,
        image_id: request.image_id,
        docker_host_id: request.docker_host_id,
        port: request.port,
        memory_limit: request.memory_limit,
        cpu_limit: request.cpu_limit,
        privileged: request.privileged,
        flag,
        points: request.points,
        status,
        ..existing
    };
    store::update_challenge(&state.db, &updated).await?;

    tracing::info!(id = %id, "Challenge updated");
    Ok(ApiResponse::message("Challenge updated successfully"))
}

/// DELETE /api/admin/challenges/{id} — refused while instances run.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let running = store::count_running_instances_for_challenge(&state.db, &id).await?;
    if running > 0 {
        return Err(ApiError::BadRequest(
            "该题目有正在运行的实例，无法删除".to_string(),
        ));
    }

    if store::delete_challenge(&state.db, &id).await? == 0 {
        return Err(ApiError::NotFound("题目不存在".to_string()));
    }

    tracing::info!(id = %id, "Challenge deleted");
    Ok(ApiResponse::message("Challenge deleted successfully"))
}

/// PUT /api/admin/challenges/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChallengeStatusRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if request.status != "published" && request.status != "unpublished" {
        return Err(ApiError::BadRequest(
            "状态必须是 published 或 unpublished".to_string(),
        ));
    }

    if store::set_challenge_status(&state.db, &id, &request.status).await? == 0 {
        return Err(ApiError::NotFound("题目不存在".to_string()));
    }

    tracing::info!(id = %id, status = %request.status, "Challenge status updated");
    Ok(ApiResponse::message("Status updated successfully"))
}
