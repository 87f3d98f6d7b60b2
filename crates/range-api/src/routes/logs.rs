//! Request-log queries for operators.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;
use crate::logstore::{self, LogFilter, LogStats};
use crate::routes::{normalize_paging, paged, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogListQuery {
    pub status: Option<i32>,
    pub status_min: Option<i32>,
    pub status_max: Option<i32>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub trace_id: Option<String>,
    /// RFC 3339 timestamps.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default = "crate::routes::default_page")]
    pub page: i64,
    #[serde(default = "crate::routes::default_page_size", rename = "pageSize")]
    pub page_size: i64,
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| ApiError::BadRequest("时间格式错误，需要 RFC3339".to_string()))
        })
        .transpose()
}

/// GET /api/admin/logs
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<LogListQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let filter = LogFilter {
        status: query.status,
        status_min: query.status_min,
        status_max: query.status_max,
        path: query.path.filter(|v| !v.is_empty()),
        method: query.method.filter(|v| !v.is_empty()),
        trace_id: query.trace_id.filter(|v| !v.is_empty()),
        start_time: parse_time(query.start_time.as_deref())?,
        end_time: parse_time(query.end_time.as_deref())?,
    };
    let (page, page_size) = normalize_paging(query.page, query.page_size);
    let (logs, total) = logstore::query_logs(&state.db, &filter, page, page_size).await?;
    Ok(ApiResponse::ok(paged(logs, total, page, page_size)))
}

/// GET /api/admin/logs/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<LogStats>>, ApiError> {
    let stats = logstore::log_stats(&state.db).await?;
    Ok(ApiResponse::ok(stats))
}
