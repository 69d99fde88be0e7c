//! Repository layer — entity-scoped database operations.
//!
//! One sub-module per table. All public functions are re-exported here.

mod health_report;
mod password_reset;
mod recommendation;
mod review_event;
mod user;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::DatabaseError;

pub use health_report::*;
pub use password_reset::*;
pub use recommendation::*;
pub use review_event::*;
pub use user::*;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn parse_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.map(parse_datetime).transpose()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad date {s:?}: {e}")))
}

pub(crate) fn parse_date_opt(s: Option<&str>) -> Result<Option<NaiveDate>, DatabaseError> {
    s.map(parse_date).transpose()
}
