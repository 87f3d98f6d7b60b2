//! Per-request trace id, structured request logging and the non-blocking
//! hand-off into the log store.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use http_body::Body as HttpBody;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONTENT_LENGTH, USER_AGENT};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::request_log::ApiLog;
use crate::state::AppState;

/// Stored body prefix length; anything longer is cut with a marker.
const BODY_LOG_LIMIT: usize = 4096;
/// Bodies above this are never buffered for logging (image uploads).
const BODY_CAPTURE_LIMIT: u64 = 64 * 1024;

pub async fn trace_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let trace_id = request
        .headers()
        .get("x-trace-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let user_agent = header_string(&request, USER_AGENT.as_str());
    let user_id = header_string(&request, "x-user-id");
    let ip = client_ip(&request);

    let (request, request_body) = capture_request_body(request).await;

    let span = tracing::info_span!("request", trace_id = %trace_id);
    let mut response = next.run(request).instrument(span).await;

    let latency_ms = started.elapsed().as_millis() as i64;
    let status = response.status().as_u16() as i32;

    // Mirror the trace id back so clients can quote it.
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }

    if status >= 500 {
        tracing::error!(status, method = %method, path = %path, ip = %ip, latency_ms, trace_id = %trace_id, "request handled");
    } else if status >= 400 {
        tracing::warn!(status, method = %method, path = %path, ip = %ip, latency_ms, trace_id = %trace_id, "request handled");
    } else {
        tracing::info!(status, method = %method, path = %path, ip = %ip, latency_ms, trace_id = %trace_id, "request handled");
    }

    let (response, response_body) = capture_response_body(response).await;
    let error_message = if status >= 400 {
        response_body.clone()
    } else {
        String::new()
    };

    state.request_logs.store(ApiLog {
        id: String::new(),
        trace_id,
        method,
        path,
        status,
        latency_ms,
        ip,
        user_agent,
        user_id,
        error_message,
        request_body,
        response_body,
        created_at: Utc::now(),
    });

    response
}

fn header_string(request: &Request, name: &str) -> String {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

async fn capture_request_body(request: Request) -> (Request, String) {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .or_else(|| request.body().size_hint().exact());

    match declared {
        Some(len) if len > 0 && len <= BODY_CAPTURE_LIMIT => {}
        _ => return (request, String::new()),
    }

    let (parts, body) = request.into_parts();
    match to_bytes(body, BODY_CAPTURE_LIMIT as usize).await {
        Ok(bytes) => {
            let text = truncate_body(&bytes);
            (Request::from_parts(parts, Body::from(bytes)), text)
        }
        Err(_) => (Request::from_parts(parts, Body::empty()), String::new()),
    }
}

async fn capture_response_body(response: Response) -> (Response, String) {
    let exact = response.body().size_hint().exact();
    match exact {
        Some(len) if len > 0 && len <= BODY_CAPTURE_LIMIT => {}
        _ => return (response, String::new()),
    }

    let (parts, body) = response.into_parts();
    match to_bytes(body, BODY_CAPTURE_LIMIT as usize).await {
        Ok(bytes) => {
            let text = truncate_body(&bytes);
            (Response::from_parts(parts, Body::from(bytes)), text)
        }
        Err(_) => (Response::from_parts(parts, Body::empty()), String::new()),
    }
}

/// UTF-8 text of the body, cut at the limit with a visible marker.
fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() > BODY_LOG_LIMIT {
        format!(
            "{}...(truncated)",
            String::from_utf8_lossy(&bytes[..BODY_LOG_LIMIT])
        )
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(truncate_body(b"{\"ok\":true}"), "{\"ok\":true}");
    }

    #[test]
    fn long_bodies_get_marker() {
        let body = vec![b'a'; BODY_LOG_LIMIT + 100];
        let text = truncate_body(&body);
        assert!(text.ends_with("...(truncated)"));
        assert_eq!(text.len(), BODY_LOG_LIMIT + "...(truncated)".len());
    }

    #[test]
    fn invalid_utf8_is_lossy_not_fatal() {
        let text = truncate_body(&[0xff, 0xfe, b'a']);
        assert!(text.contains('a'));
    }
}
