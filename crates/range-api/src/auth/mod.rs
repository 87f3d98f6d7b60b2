pub mod jwt;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Operator identity extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub admin_id: String,
    pub username: String,
}

/// Auth middleware for the operator surface.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get("authorization")
        .ok_or_else(|| ApiError::Unauthorized("未提供认证token".to_string()))?;
    let header_str = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("token格式错误".to_string()))?;
    let token = header_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("token格式错误".to_string()))?;

    let claims = jwt::parse_admin_token(&state.config.jwt_secret, token)
        .map_err(|_| ApiError::Unauthorized("token无效或已过期".to_string()))?;

    request.extensions_mut().insert(AuthenticatedAdmin {
        admin_id: claims.admin_id,
        username: claims.username,
    });
    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAdmin>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("未提供认证token".to_string()))
    }
}

/// The authenticated end user making a request. Token verification happens
/// upstream; the trusted gateway forwards the principal in `X-User-ID`.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Actor(id.to_string()))
            .ok_or_else(|| ApiError::Unauthorized("未提供用户身份".to_string()))
    }
}
