//! Audit logging middleware.
//!
//! Logs every API request with user, method, path, status, and latency.
//! Runs innermost (after auth has injected AuthContext).

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user = req
        .extensions()
        .get::<AuthContext>()
        .map(|a| (a.user_id.to_string(), a.role.as_str()));
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    let (user_id, role) = user.unwrap_or_else(|| ("-".to_string(), "anonymous"));
    if status >= 500 {
        tracing::warn!(target: "labwise::audit", %method, %path, status, latency_ms, %user_id, role, "API request failed");
    } else {
        tracing::info!(target: "labwise::audit", %method, %path, status, latency_ms, %user_id, role, "API request");
    }

    response
}
