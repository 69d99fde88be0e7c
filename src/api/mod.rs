//! REST API for the browser client.
//!
//! Routes are nested under `/api/`. Credential routes are rate limited;
//! everything else except liveness requires a bearer token.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{build_app, run_server, ServerError};
pub use types::ApiContext;
