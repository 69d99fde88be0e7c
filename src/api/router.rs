//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/` in three groups:
//! 1. Public: liveness only
//! 2. Credential routes: rate limited, no auth
//! 3. Everything else: auth validator, then audit logger

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router with all endpoints under `/api/`.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Audit (innermost) → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/me", get(endpoints::auth::me))
        .route(
            "/users/profile",
            get(endpoints::users::get_profile).put(endpoints::users::update_profile),
        )
        .route("/users/doctors", get(endpoints::users::doctors))
        .route("/health-reports/upload", post(endpoints::health_reports::upload))
        .route(
            "/health-reports/patient/reports",
            get(endpoints::health_reports::patient_reports),
        )
        .route("/health-reports/:id", get(endpoints::health_reports::get_report))
        .route(
            "/health-reports/:id/assign",
            post(endpoints::health_reports::assign_doctor),
        )
        .route("/doctor-review/dashboard", get(endpoints::doctor_review::dashboard))
        .route("/doctor-review/pending", get(endpoints::doctor_review::pending))
        .route("/doctor-review/unassigned", get(endpoints::doctor_review::unassigned))
        .route("/doctor-review/reviewed", get(endpoints::doctor_review::reviewed))
        .route(
            "/doctor-review/:id",
            get(endpoints::doctor_review::detail).put(endpoints::doctor_review::modify),
        )
        .route("/doctor-review/:id/history", get(endpoints::doctor_review::history))
        .route("/doctor-review/:id/claim", post(endpoints::doctor_review::claim))
        .route("/doctor-review/:id/approve", post(endpoints::doctor_review::approve))
        .route("/doctor-review/:id/reject", post(endpoints::doctor_review::reject))
        .route(
            "/ai-recommendations/insights/:report_id",
            get(endpoints::ai_recommendations::insights),
        )
        .route(
            "/ai-recommendations/personalized",
            get(endpoints::ai_recommendations::personalized),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Credential routes (rate-limited only, no auth required)
    let credentials = Router::new()
        .route("/auth/signup", post(endpoints::auth::signup))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/auth/forgot-password", post(endpoints::auth::forgot_password))
        .route(
            "/auth/reset-password/:token",
            get(endpoints::auth::check_reset_token).post(endpoints::auth::reset_password),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", credentials)
        .nest("/api", public)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
}
