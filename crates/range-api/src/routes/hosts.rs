//! Docker host management. Edits invalidate the cached engine client so the
//! next use reconstructs with fresh parameters.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::host::{DockerHost, HostRequest};
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::store;

/// GET /api/admin/docker-hosts
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DockerHost>>>, ApiError> {
    let hosts = store::list_hosts(&state.db, false).await?;
    Ok(ApiResponse::ok(hosts))
}

/// POST /api/admin/docker-hosts
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<HostRequest>,
) -> Result<Json<ApiResponse<DockerHost>>, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;

    let now = Utc::now();
    let host = DockerHost {
        id: Uuid::new_v4().to_string(),
        name: request.name,
        host: request.host,
        tls_verify: request.tls_verify,
        cert_path: request.cert_path,
        port_range_min: request.port_range_min,
        port_range_max: request.port_range_max,
        memory_limit: request.memory_limit,
        cpu_limit: request.cpu_limit,
        enabled: request.enabled,
        is_default: request.is_default,
        description: request.description,
        created_at: now,
        updated_at: now,
    };
    store::insert_host(&state.db, &host).await?;

    tracing::info!(host_id = %host.id, name = %host.name, "Docker host created");
    Ok(ApiResponse::ok_msg("创建成功", host))
}

/// PUT /api/admin/docker-hosts/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<HostRequest>,
) -> Result<Json<ApiResponse<DockerHost>>, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;

    let existing = store::get_host(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Docker 主机不存在".to_string()))?;

    let host = DockerHost {
        name: request.name,
        host: request.host,
        tls_verify: request.tls_verify,
        cert_path: request.cert_path,
        port_range_min: request.port_range_min,
        port_range_max: request.port_range_max,
        memory_limit: request.memory_limit,
        cpu_limit: request.cpu_limit,
        enabled: request.enabled,
        is_default: request.is_default,
        description: request.description,
        updated_at: Utc::now(),
        ..existing
    };
    store::update_host(&state.db, &host).await?;

    // Force the next use to reconnect with the new parameters.
    state.engines.remove(&id).await;

    tracing::info!(host_id = %id, name = %host.name, "Docker host updated");
    Ok(ApiResponse::ok_msg("更新成功", host))
}

/// DELETE /api/admin/docker-hosts/{id} — refused while challenges refer to it.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let referencing = store::count_challenges_for_host(&state.db, &id).await?;
    if referencing > 0 {
        return Err(ApiError::BadRequest(format!(
            "无法删除：有 {referencing} 个题目关联此 Docker 主机"
        )));
    }

    if store::delete_host(&state.db, &id).await? == 0 {
        return Err(ApiError::NotFound("Docker 主机不存在".to_string()));
    }
    state.engines.remove(&id).await;

    tracing::info!(host_id = %id, "Docker host deleted");
    Ok(ApiResponse::message("删除成功"))
}

/// POST /api/admin/docker-hosts/{id}/test
///
/// Ping failures come back as a payload, not a 5xx.
pub async fn test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let host = store::get_host(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Docker 主机不存在".to_string()))?;

    match state.engines.ping(&host).await {
        Ok(()) => {
            tracing::info!(host_id = %id, "Docker host connection test succeeded");
            Ok(ApiResponse::ok_msg(
                "连接测试成功",
                serde_json::json!({ "success": true }),
            ))
        }
        Err(err) => {
            tracing::warn!(host_id = %id, error = %err, "Docker host connection test failed");
            Ok(ApiResponse::ok_msg(
                "连接测试失败",
                serde_json::json!({ "success": false, "error": err.to_string() }),
            ))
        }
    }
}

/// POST /api/admin/docker-hosts/{id}/toggle
pub async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DockerHost>>, ApiError> {
    let host = store::toggle_host(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Docker 主机不存在".to_string()))?;

    tracing::info!(host_id = %id, enabled = host.enabled, "Docker host toggled");
    Ok(ApiResponse::ok_msg("状态已更新", host))
}
