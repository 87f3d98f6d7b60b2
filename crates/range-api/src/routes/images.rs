//! Image management: listing, manual registration, registry sync, preload
//! and tarball upload.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::image::{DockerImage, RegisterImageRequest, SyncRequest};
use crate::routes::ApiResponse;
use crate::services::images::ImportResult;
use crate::state::AppState;
use crate::store;

/// GET /api/admin/images
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DockerImage>>>, ApiError> {
    let images = store::list_images(&state.db).await?;
    Ok(ApiResponse::ok(images))
}

/// POST /api/admin/images
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterImageRequest>,
) -> Result<Json<ApiResponse<DockerImage>>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("镜像名称不能为空".to_string()));
    }

    let image = state
        .images
        .register(&request.name, &request.tag, &request.description)
        .await?;
    Ok(ApiResponse::ok_msg("镜像注册成功", image))
}

/// DELETE /api/admin/images/{id} — refused while challenges refer to it.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let referencing = store::count_challenges_for_image(&state.db, &id).await?;
    if referencing > 0 {
        return Err(ApiError::BadRequest(format!(
            "无法删除：有 {referencing} 个题目关联此镜像"
        )));
    }

    if store::delete_image(&state.db, &id).await? == 0 {
        return Err(ApiError::NotFound("镜像不存在".to_string()));
    }
    Ok(ApiResponse::message("删除成功"))
}

/// POST /api/admin/images/sync
pub async fn sync(
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let registry_url = body.and_then(|Json(req)| req.registry_url);
    let synced = state
        .images
        .sync_from_registry(registry_url.as_deref())
        .await?;
    Ok(ApiResponse::ok_msg(
        "同步完成",
        serde_json::json!({ "synced": synced }),
    ))
}

/// POST /api/admin/images/preload
pub async fn preload(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let hosts = state.images.preload_all().await?;
    Ok(ApiResponse::ok_msg(
        "镜像预加载任务已启动",
        serde_json::json!({ "hosts": hosts }),
    ))
}

fn acceptable_archive(file_name: &str) -> bool {
    file_name.ends_with(".tar") || file_name.ends_with(".tar.gz")
}

/// POST /api/admin/images/upload — multipart `file` field, ≤ 2 GB, streamed
/// to the staging directory and imported through the engine CLI.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ImportResult>>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("无效的上传请求: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(|name| name.rsplit(['/', '\\']).next())
            .unwrap_or_default()
            .to_string();
        if !acceptable_archive(&file_name) {
            return Err(ApiError::BadRequest(
                "仅支持 .tar 或 .tar.gz 格式".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&state.config.upload_dir)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        let staged = state
            .config
            .upload_dir
            .join(format!("upload_{}_{}", Uuid::new_v4(), file_name));

        let mut file = tokio::fs::File::create(&staged)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        loop {
            let chunk = field
                .chunk()
                .await
                .map_err(|err| ApiError::BadRequest(format!("上传中断: {err}")))?;
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk)
                .await
                .map_err(|err| ApiError::Internal(err.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        drop(file);

        let result = match state.images.import_from_tar(&staged).await {
            Ok(result) => result,
            Err(err) => {
                let _ = tokio::fs::remove_file(&staged).await;
                return Err(err);
            }
        };
        return Ok(ApiResponse::ok_msg("镜像导入成功", result));
    }

    Err(ApiError::BadRequest("缺少文件字段".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_extension_check() {
        assert!(acceptable_archive("app.tar"));
        assert!(acceptable_archive("app.tar.gz"));
        assert!(!acceptable_archive("app.zip"));
        assert!(!acceptable_archive("app.gz.tar.txt"));
        assert!(!acceptable_archive(""));
    }
}
