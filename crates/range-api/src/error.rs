use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::engine::EngineError;
use crate::index::IndexError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal failure classes never leak details to the caller; the
        // full error is logged here and only a fixed message goes out.
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Engine(err) => {
                tracing::error!(error = %err, "Engine failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "容器引擎操作失败".to_string())
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "数据库操作失败".to_string())
            }
            ApiError::Index(err) => {
                tracing::error!(error = %err, "State index failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "实例状态存储失败".to_string())
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "系统错误".to_string())
            }
        };

        let body = serde_json::json!({ "code": status.as_u16(), "msg": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ApiError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn internal_errors_do_not_leak() {
        let resp = ApiError::Internal("secret detail".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
