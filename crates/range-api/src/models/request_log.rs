use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::PgRow;

/// One API request record. Bodies are truncated before they get here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLog {
    pub id: String,
    pub trace_id: String,
    pub method: String,
    pub path: String,
    pub status: i32,
    pub latency_ms: i64,
    pub ip: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_body: String,
    pub created_at: DateTime<Utc>,
}

impl ApiLog {
    pub fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            trace_id: row.try_get("trace_id")?,
            method: row.try_get("method")?,
            path: row.try_get("path")?,
            status: row.try_get("status")?,
            latency_ms: row.try_get("latency_ms")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            user_id: row.try_get("user_id")?,
            error_message: row.try_get("error_message")?,
            request_body: row.try_get("request_body")?,
            response_body: row.try_get("response_body")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
