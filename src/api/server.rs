//! HTTP server lifecycle: bind, serve the API router, stop on Ctrl-C.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::api::router::build_router;
use crate::api::types::ApiContext;
use crate::config::ServerConfig;
use crate::core_state::CoreState;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// CORS for the browser client. Without a configured origin any origin is
/// accepted; tokens travel in headers, never cookies.
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ServerError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Ok(match origin {
        Some(origin) => {
            let value = HeaderValue::from_str(origin)
                .map_err(|_| ServerError::InvalidOrigin(origin.to_string()))?;
            layer.allow_origin(value)
        }
        None => layer.allow_origin(Any),
    })
}

/// The full application: API routes plus CORS.
pub fn build_app(core: Arc<CoreState>, config: &ServerConfig) -> Result<Router, ServerError> {
    let ctx = ApiContext::new(core).with_trusted_proxies(&config.trusted_proxies);
    Ok(build_router(ctx).layer(cors_layer(config.cors_origin.as_deref())?))
}

/// Serve `app` on an already bound listener until `shutdown` resolves.
pub async fn serve_until<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run_server(core: Arc<CoreState>, config: &ServerConfig) -> Result<(), ServerError> {
    let app = build_app(core, config)?;
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind,
            source,
        })?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API server listening");

    serve_until(listener, app, ctrl_c()).await?;

    tracing::info!("API server stopped");
    Ok(())
}
