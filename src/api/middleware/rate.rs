//! Per-client rate limiting middleware for the credential endpoints.
//!
//! Sliding window per client address: 10 requests per minute, 100 per hour.
//! Forwarded headers count only when a configured proxy sent them.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Client key: the peer address. `X-Forwarded-For` is read only when the
/// peer is a trusted proxy, and then the rightmost hop not itself a trusted
/// proxy names the client. Without connection info every caller shares one
/// key.
fn rate_key(req: &Request<axum::body::Body>, trusted: &[IpAddr]) -> String {
    let Some(peer) = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "anonymous".to_string();
    };

    if !trusted.contains(&peer) {
        return format!("ip:{peer}");
    }

    let client = req
        .headers()
        .get_all("X-Forwarded-For")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .filter_map(|hop| hop.parse::<IpAddr>().ok())
        .find(|ip| !trusted.contains(ip))
        .unwrap_or(peer);
    format!("ip:{client}")
}

/// Returns 429 with `Retry-After` if the client is over its limit.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request<axum::body::Body>, next: Next) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req, &ctx.trusted_proxies);

    // MutexGuard is !Send, drop before .await
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter.check(&key).map_err(|retry_after| {
            tracing::warn!(%key, retry_after, "Rate limit exceeded");
            ApiError::RateLimited { retry_after }
        })?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(peer: &str, forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/auth/login");
        if let Some(xff) = forwarded {
            builder = builder.header("X-Forwarded-For", xff);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn untrusted_peer_ignores_forwarded_header() {
        let req = request("203.0.113.9:5000", Some("10.0.0.1"));
        assert_eq!(rate_key(&req, &[]), "ip:203.0.113.9");
        assert_eq!(rate_key(&req, &[ip("10.0.0.1")]), "ip:203.0.113.9");
    }

    #[test]
    fn trusted_proxy_names_rightmost_untrusted_hop() {
        let proxies = [ip("10.0.0.2"), ip("10.0.0.3")];
        let req = request("10.0.0.2:443", Some("6.6.6.6, 198.51.100.7, 10.0.0.3"));
        assert_eq!(rate_key(&req, &proxies), "ip:198.51.100.7");
    }

    #[test]
    fn trusted_proxy_without_usable_header_falls_back_to_peer() {
        let proxies = [ip("10.0.0.2")];
        assert_eq!(rate_key(&request("10.0.0.2:443", None), &proxies), "ip:10.0.0.2");
        assert_eq!(
            rate_key(&request("10.0.0.2:443", Some("garbage")), &proxies),
            "ip:10.0.0.2"
        );
    }

    #[test]
    fn missing_connect_info_is_one_shared_key() {
        let req = Request::builder()
            .header("X-Forwarded-For", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        assert_eq!(rate_key(&req, &[]), "anonymous");
    }
}
