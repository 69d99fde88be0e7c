//! API endpoint handlers, one module per route group.

pub mod ai_recommendations;
pub mod auth;
pub mod doctor_review;
pub mod health;
pub mod health_reports;
pub mod users;

use uuid::Uuid;

use crate::api::error::ApiError;

/// Parse a path segment as a UUID.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {raw}")))
}
