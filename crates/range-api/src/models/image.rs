use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::PgRow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerImage {
    pub id: String,
    pub name: String,
    pub tag: String,
    /// Registry authority, e.g. `registry.internal:5000`.
    pub registry: String,
    pub size: i64,
    pub digest: String,
    pub architecture: String,
    pub recommended_memory: i64,
    pub recommended_cpu: f64,
    pub is_available: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DockerImage {
    pub fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            tag: row.try_get("tag")?,
            registry: row.try_get("registry")?,
            size: row.try_get("size")?,
            digest: row.try_get("digest")?,
            architecture: row.try_get("architecture")?,
            recommended_memory: row.try_get("recommended_memory")?,
            recommended_cpu: row.try_get("recommended_cpu")?,
            is_available: row.try_get("is_available")?,
            last_sync_at: row.try_get("last_sync_at")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Canonical full form: `registry/name:tag`.
    pub fn full_name(&self) -> String {
        format!("{}/{}:{}", self.registry, self.name, self.tag)
    }

    /// Canonical short form: `name:tag`.
    pub fn short_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterImageRequest {
    pub name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub description: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SyncRequest {
    pub registry_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        let image = DockerImage {
            id: "x".to_string(),
            name: "nginx".to_string(),
            tag: "alpine".to_string(),
            registry: "registry.internal:5000".to_string(),
            size: 0,
            digest: String::new(),
            architecture: "amd64".to_string(),
            recommended_memory: 0,
            recommended_cpu: 0.0,
            is_available: true,
            last_sync_at: None,
            description: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(image.short_name(), "nginx:alpine");
        assert_eq!(image.full_name(), "registry.internal:5000/nginx:alpine");
    }
}
