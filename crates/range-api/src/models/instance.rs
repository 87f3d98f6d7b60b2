use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::PgRow;

/// A live materialization of a challenge for one actor, bound to exactly one
/// container on one host. The per-instance flag never serializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub user_id: String,
    pub challenge_id: String,
    pub container_id: String,
    pub docker_host_id: String,
    #[serde(skip_serializing)]
    pub flag: String,
    pub port: i32,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    pub fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            challenge_id: row.try_get("challenge_id")?,
            container_id: row.try_get("container_id")?,
            docker_host_id: row.try_get("docker_host_id")?,
            flag: row.try_get("flag")?,
            port: row.try_get("port")?,
            status: row.try_get("status")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Admin listing row: instance joined with its challenge title.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceWithChallenge {
    #[serde(flatten)]
    pub instance: Instance,
    pub challenge_title: String,
}
