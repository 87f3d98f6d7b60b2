//! Operator login and the dashboard endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::admin::LoginRequest;
use crate::routes::{normalize_paging, paged, ApiResponse};
use crate::state::AppState;
use crate::store::{self, SubmissionFilter};

/// POST /api/admin/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("Invalid request format".to_string()));
    }

    let (token, admin) = state
        .admins
        .login(&request.username, &request.password)
        .await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "token": token,
        "admin": {
            "id": admin.id,
            "username": admin.username,
            "email": admin.email,
            "name": admin.name,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct SubmissionListQuery {
    pub user: Option<String>,
    pub challenge: Option<String>,
    /// "correct" or "wrong".
    pub result: Option<String>,
    #[serde(default = "crate::routes::default_page")]
    pub page: i64,
    #[serde(default = "crate::routes::default_page_size", rename = "pageSize")]
    pub page_size: i64,
}

/// GET /api/admin/submissions
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let correct = match query.result.as_deref() {
        Some("correct") => Some(true),
        Some("wrong") => Some(false),
        Some(other) if !other.is_empty() => {
            return Err(ApiError::BadRequest(
                "result 必须是 correct 或 wrong".to_string(),
            ));
        }
        _ => None,
    };

    let filter = SubmissionFilter {
        user_id: query.user.filter(|v| !v.is_empty()),
        challenge_id: query.challenge.filter(|v| !v.is_empty()),
        correct,
    };
    let (page, page_size) = normalize_paging(query.page, query.page_size);
    let (submissions, total) = store::list_submissions(&state.db, &filter, page, page_size).await?;
    Ok(ApiResponse::ok(paged(submissions, total, page, page_size)))
}

/// GET /api/admin/overview/stats
pub async fn overview_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<store::OverviewStats>>, ApiError> {
    let stats = store::overview_stats(&state.db).await?;
    Ok(ApiResponse::ok(stats))
}
