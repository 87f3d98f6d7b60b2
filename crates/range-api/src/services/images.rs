//! Image synchronization and preload: registry catalog sync, per-host
//! warmup, and tar import via the engine's own command surface.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use uuid::Uuid;

use crate::db::PgPool;
use crate::engine::{EngineError, EnginePool};
use crate::error::ApiError;
use crate::models::image::DockerImage;
use crate::store;

#[derive(Clone)]
pub struct ImageService {
    db: PgPool,
    engines: Arc<EnginePool>,
    http: reqwest::Client,
    registry_url: String,
}

#[derive(Debug, Deserialize)]
struct RegistryCatalog {
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryTags {
    tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    /// Image name as the engine loaded it.
    pub image_name: String,
    /// Full tag the image was pushed under.
    pub registry_tag: String,
    pub pushed: bool,
}

impl ImageService {
    pub fn new(db: PgPool, engines: Arc<EnginePool>, registry_url: String) -> Self {
        Self {
            db,
            engines,
            http: reqwest::Client::new(),
            registry_url,
        }
    }

    pub async fn register(
        &self,
        name: &str,
        tag: &str,
        description: &str,
    ) -> Result<DockerImage, ApiError> {
        if store::get_image_by_name(&self.db, name, tag).await?.is_some() {
            return Err(ApiError::BadRequest(format!("镜像已存在: {name}:{tag}")));
        }

        let now = Utc::now();
        let image = DockerImage {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
            registry: registry_authority(&self.registry_url),
            size: 0,
            digest: String::new(),
            architecture: "amd64".to_string(),
            recommended_memory: 0,
            recommended_cpu: 0.0,
            is_available: true,
            last_sync_at: None,
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        };
        store::insert_image(&self.db, &image).await?;
        tracing::info!(image = %image.short_name(), "Image registered");
        Ok(image)
    }

    /// Enumerate the registry catalog and insert rows for unknown
    /// (repository, tag) pairs. Individual tag failures are logged and
    /// skipped. Returns the number of newly inserted rows.
    pub async fn sync_from_registry(&self, registry_url: Option<&str>) -> Result<usize, ApiError> {
        let base = registry_url.unwrap_or(&self.registry_url).trim_end_matches('/');
        tracing::info!(registry = %base, "Syncing images from registry");

        let catalog: RegistryCatalog = self
            .http
            .get(format!("{base}/v2/_catalog"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| ApiError::BadRequest(format!("无法连接到 Registry: {err}")))?
            .json()
            .await
            .map_err(|err| ApiError::BadRequest(format!("解析 Registry 响应失败: {err}")))?;

        tracing::info!(count = catalog.repositories.len(), "Discovered repositories");

        let authority = registry_authority(base);
        let mut synced = 0usize;

        for repo in &catalog.repositories {
            let tags: RegistryTags = match self
                .http
                .get(format!("{base}/v2/{repo}/tags/list"))
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
            {
                Ok(resp) => match resp.json().await {
                    Ok(tags) => tags,
                    Err(err) => {
                        tracing::warn!(repo = %repo, error = %err, "Failed to parse tag list");
                        continue;
                    }
                },
                Err(err) => {
                    tracing::warn!(repo = %repo, error = %err, "Failed to fetch tag list");
                    continue;
                }
            };

            for tag in tags.tags.unwrap_or_default() {
                if store::get_image_by_name(&self.db, repo, &tag).await?.is_some() {
                    continue;
                }

                let now = Utc::now();
                let image = DockerImage {
                    id: Uuid::new_v4().to_string(),
                    name: repo.clone(),
                    tag: tag.clone(),
                    registry: authority.clone(),
                    size: 0,
                    digest: String::new(),
                    architecture: "amd64".to_string(),
                    recommended_memory: 0,
                    recommended_cpu: 0.0,
                    is_available: true,
                    last_sync_at: None,
                    description: "从 Registry 自动同步".to_string(),
                    created_at: now,
                    updated_at: now,
                };
                if let Err(err) = store::insert_image(&self.db, &image).await {
                    tracing::warn!(name = %repo, tag = %tag, error = %err, "Failed to insert image row");
                    continue;
                }
                tracing::info!(name = %repo, tag = %tag, "Image synced");
                synced += 1;
            }
        }

        tracing::info!(synced = synced, "Registry sync complete");
        Ok(synced)
    }

    /// Warm every available image on one host, pulling to completion where
    /// the engine lacks it locally.
    pub async fn preload_images(&self, host_id: &str) -> Result<(), ApiError> {
        let host = store::get_host(&self.db, host_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("主机不存在".to_string()))?;
        let images = store::list_images(&self.db).await?;
        let engine = self.engines.get_or_create(&host).await?;

        for image in images {
            let full_name = image.full_name();
            tracing::info!(host = %host.name, image = %full_name, "Preloading image");
            if let Err(err) = engine.ensure_image(&full_name).await {
                tracing::warn!(image = %full_name, error = %err, "Image preload failed");
                continue;
            }
            if let Err(err) = store::touch_image_sync(&self.db, &image.id).await {
                tracing::warn!(image = %full_name, error = %err, "Failed to record sync time");
            }
        }
        Ok(())
    }

    /// Kick off one detached preload per enabled host. The tasks outlive the
    /// caller's request on purpose. Returns the number of hosts touched.
    pub async fn preload_all(&self) -> Result<usize, ApiError> {
        let hosts = store::list_hosts(&self.db, true).await?;
        tracing::info!(host_count = hosts.len(), "Starting image preload");

        for host in &hosts {
            let service = self.clone();
            let host_id = host.id.clone();
            let host_name = host.name.clone();
            tokio::spawn(async move {
                if let Err(err) = service.preload_images(&host_id).await {
                    tracing::warn!(host = %host_name, error = %err, "Host preload failed");
                }
            });
        }
        Ok(hosts.len())
    }

    /// Load a tarball through the engine CLI, retag it into the local
    /// registry and push. The CLI is the most reliable surface for layered
    /// tars, so shelling out here is deliberate.
    pub async fn import_from_tar(&self, tar_path: &Path) -> Result<ImportResult, ApiError> {
        tracing::info!(file = %tar_path.display(), "Importing image tarball");

        let tar_arg = tar_path.to_string_lossy();
        let output = run_engine_cli(&["load", "-i", tar_arg.as_ref()]).await?;
        let loaded = parse_loaded_image(&output).ok_or_else(|| {
            ApiError::BadRequest(format!("无法解析镜像名，docker load 输出: {output}"))
        })?;
        tracing::info!(image = %loaded, "Image loaded");

        let (name, tag) = normalize_loaded_image(&loaded);
        let authority = registry_authority(&self.registry_url);
        let registry_tag = format!("{authority}/{name}:{tag}");

        run_engine_cli(&["tag", &loaded, &registry_tag]).await?;
        run_engine_cli(&["push", &registry_tag]).await?;
        tracing::info!(registry_tag = %registry_tag, "Image pushed");

        match store::get_image_by_name(&self.db, &name, &tag).await? {
            Some(existing) => store::touch_image(&self.db, &existing.id).await?,
            None => {
                let now = Utc::now();
                let image = DockerImage {
                    id: Uuid::new_v4().to_string(),
                    name: name.clone(),
                    tag: tag.clone(),
                    registry: authority,
                    size: 0,
                    digest: String::new(),
                    architecture: "amd64".to_string(),
                    recommended_memory: 0,
                    recommended_cpu: 0.0,
                    is_available: true,
                    last_sync_at: None,
                    description: "通过上传导入".to_string(),
                    created_at: now,
                    updated_at: now,
                };
                store::insert_image(&self.db, &image).await?;
            }
        }

        if let Err(err) = tokio::fs::remove_file(tar_path).await {
            tracing::warn!(file = %tar_path.display(), error = %err, "Failed to remove staged tarball");
        }

        tracing::info!(name = %name, tag = %tag, "Image import complete");
        Ok(ImportResult {
            image_name: loaded,
            registry_tag,
            pushed: true,
        })
    }
}

async fn run_engine_cli(args: &[&str]) -> Result<String, ApiError> {
    let output = Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|err| ApiError::Engine(EngineError::Api(err.to_string())))?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if !output.status.success() {
        return Err(ApiError::Engine(EngineError::Api(format!(
            "docker {} failed: {}",
            args.first().unwrap_or(&""),
            combined.trim()
        ))));
    }
    Ok(combined)
}

/// Registry authority component of a base URL: scheme and path stripped.
pub fn registry_authority(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped
        .split('/')
        .next()
        .unwrap_or(stripped)
        .to_string()
}

/// Pick the `Loaded image: name:tag` line out of `docker load` output.
/// `Loaded image ID: sha256:...` lines carry no usable name and never match.
pub fn parse_loaded_image(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.split_once("Loaded image:")
            .map(|(_, rest)| rest.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// Reduce a loaded reference to (name, tag), stripping any source registry
/// or namespace prefix.
pub fn normalize_loaded_image(loaded: &str) -> (String, String) {
    let repo = loaded.rsplit('/').next().unwrap_or(loaded);
    match repo.split_once(':') {
        Some((name, tag)) if !tag.is_empty() => (name.to_string(), tag.to_string()),
        _ => (repo.trim_end_matches(':').to_string(), "latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_strips_scheme_and_path() {
        assert_eq!(registry_authority("http://localhost:5000"), "localhost:5000");
        assert_eq!(
            registry_authority("https://registry.internal:5000/v2"),
            "registry.internal:5000"
        );
        assert_eq!(registry_authority("registry.internal"), "registry.internal");
    }

    #[test]
    fn parses_loaded_image_line() {
        let output = "some noise\nLoaded image: nginx:latest\n";
        assert_eq!(parse_loaded_image(output).as_deref(), Some("nginx:latest"));
    }

    #[test]
    fn ignores_loaded_image_id_lines() {
        let output = "Loaded image ID: sha256:deadbeef\n";
        assert_eq!(parse_loaded_image(output), None);
    }

    #[test]
    fn normalizes_references() {
        assert_eq!(
            normalize_loaded_image("nginx:latest"),
            ("nginx".to_string(), "latest".to_string())
        );
        assert_eq!(
            normalize_loaded_image("nginx"),
            ("nginx".to_string(), "latest".to_string())
        );
        assert_eq!(
            normalize_loaded_image("ghcr.io/acme/web:1.2"),
            ("web".to_string(), "1.2".to_string())
        );
        assert_eq!(
            normalize_loaded_image("localhost:5000/nginx:alpine"),
            ("nginx".to_string(), "alpine".to_string())
        );
    }
}
