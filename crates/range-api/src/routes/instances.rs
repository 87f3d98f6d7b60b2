//! Operator instance views: paged listing, live container stats and log
//! tails.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::engine::ContainerStats;
use crate::error::ApiError;
use crate::models::host::DockerHost;
use crate::models::instance::Instance;
use crate::routes::{normalize_paging, paged, ApiResponse};
use crate::state::AppState;
use crate::store::{self, InstanceFilter};

#[derive(Debug, Deserialize)]
pub struct InstanceListQuery {
    pub status: Option<String>,
    /// Challenge id filter.
    pub challenge: Option<String>,
    #[serde(default = "crate::routes::default_page")]
    pub page: i64,
    #[serde(default = "crate::routes::default_page_size", rename = "pageSize")]
    pub page_size: i64,
}

/// GET /api/admin/instances
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<InstanceListQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let filter = InstanceFilter {
        status: query.status.filter(|v| !v.is_empty()),
        challenge_id: query.challenge.filter(|v| !v.is_empty()),
    };
    let (page, page_size) = normalize_paging(query.page, query.page_size);
    let (instances, total) = store::list_instances(&state.db, &filter, page, page_size).await?;
    Ok(ApiResponse::ok(paged(instances, total, page, page_size)))
}

async fn instance_host(state: &AppState, instance: &Instance) -> Result<DockerHost, ApiError> {
    store::get_host(&state.db, &instance.docker_host_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Docker 主机配置不存在".to_string()))
}

/// GET /api/admin/instances/{id}/stats
pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ContainerStats>>, ApiError> {
    let instance = store::get_instance(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("实例不存在".to_string()))?;

    if instance.status != "running" {
        return Err(ApiError::BadRequest("实例未在运行状态".to_string()));
    }

    let host = instance_host(&state, &instance).await?;
    let engine = state.engines.get_or_create(&host).await?;
    let stats = engine.stats(&instance.container_id).await?;
    Ok(ApiResponse::ok(stats))
}

#[derive(Debug, Deserialize)]
pub struct LogTailQuery {
    #[serde(default)]
    pub tail: usize,
}

/// GET /api/admin/instances/{id}/logs?tail=N
pub async fn container_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogTailQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let instance = store::get_instance(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("实例不存在".to_string()))?;

    if instance.status == "expired" && instance.container_id.is_empty() {
        return Err(ApiError::BadRequest(
            "容器已删除，无法获取日志".to_string(),
        ));
    }

    let host = instance_host(&state, &instance).await?;
    let engine = state.engines.get_or_create(&host).await?;
    let logs = engine.logs(&instance.container_id, query.tail).await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "logs": logs,
        "container_id": instance.container_id,
    })))
}
