pub mod admin;
pub mod admin_challenges;
pub mod challenges;
pub mod hosts;
pub mod images;
pub mod instances;
pub mod logs;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth;
use crate::state::AppState;

/// Uniform response envelope: `code` mirrors the HTTP class, `msg` carries
/// the fixed catalog message, `data` the payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Self::ok_msg("success", data)
    }

    pub fn ok_msg(msg: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            code: 200,
            msg: msg.into(),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    pub fn message(msg: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: 200,
            msg: msg.into(),
            data: None,
        })
    }
}

pub(crate) fn default_page() -> i64 {
    1
}

pub(crate) fn default_page_size() -> i64 {
    20
}

pub fn normalize_paging(page: i64, page_size: i64) -> (i64, i64) {
    (page.max(1), page_size.clamp(1, 100))
}

/// Paged listing payload: `{list, total, page, pageSize}`.
pub fn paged<T: Serialize>(list: Vec<T>, total: i64, page: i64, page_size: i64) -> serde_json::Value {
    serde_json::json!({
        "list": list,
        "total": total,
        "page": page,
        "pageSize": page_size,
    })
}

const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let user = Router::new()
        .route("/challenges", get(challenges::list))
        .route("/challenges/{id}/start", post(challenges::start))
        .route("/challenges/{id}/stop", post(challenges::stop))
        .route("/submit", post(challenges::submit));

    let admin_public = Router::new().route("/login", post(admin::login));

    let admin_protected = Router::new()
        .route(
            "/challenges",
            get(admin_challenges::list).post(admin_challenges::create),
        )
        .route(
            "/challenges/{id}",
            get(admin_challenges::get_one)
                .put(admin_challenges::update)
                .delete(admin_challenges::remove),
        )
        .route("/challenges/{id}/status", put(admin_challenges::update_status))
        .route("/instances", get(instances::list))
        .route("/instances/{id}/stats", get(instances::stats))
        .route("/instances/{id}/logs", get(instances::container_logs))
        .route("/submissions", get(admin::list_submissions))
        .route("/overview/stats", get(admin::overview_stats))
        .route("/docker-hosts", get(hosts::list).post(hosts::create))
        .route("/docker-hosts/{id}", put(hosts::update).delete(hosts::remove))
        .route("/docker-hosts/{id}/test", post(hosts::test))
        .route("/docker-hosts/{id}/toggle", post(hosts::toggle))
        .route("/images", get(images::list).post(images::register))
        .route("/images/{id}", delete(images::remove))
        .route("/images/sync", post(images::sync))
        .route("/images/preload", post(images::preload))
        .route(
            "/images/upload",
            post(images::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/logs", get(logs::list))
        .route("/logs/stats", get(logs::stats))
        .layer(from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .nest("/api", user)
        .nest("/api/admin", admin_public.merge(admin_protected))
        .layer(from_fn_with_state(
            state.clone(),
            crate::middleware::trace_requests,
        ))
        .with_state(state)
}
