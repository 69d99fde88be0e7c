//! Doctor review queue and review actions.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext, ListQuery};
use crate::db::repository::{
    count_recommendations_by_status, count_unassigned_recommendations, get_health_report,
    get_user, list_recommendations_for_doctor, list_reviewed_recommendations,
    list_unassigned_recommendations,
};
use crate::models::enums::ReviewStatus;
use crate::models::{PatientSummary, Recommendation, ReviewEvent};
use crate::reports::{DoctorReportView, QueueItem};
use crate::review::{self, ReviewUpdate};

/// Statuses still waiting on the assigned doctor.
const OPEN_STATUSES: [ReviewStatus; 2] = [ReviewStatus::UnderReview, ReviewStatus::Modified];

#[derive(Serialize, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub under_review: i64,
    pub modified: i64,
    pub approved: i64,
    pub rejected: i64,
    pub unassigned: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub counts: DashboardCounts,
    pub open: Vec<QueueItem>,
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub items: Vec<QueueItem>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub events: Vec<ReviewEvent>,
}

#[derive(Serialize)]
pub struct RecommendationResponse {
    pub recommendation: Recommendation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApproveRequest {
    pub doctor_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

fn tally(counts: &[(ReviewStatus, i64)], unassigned: i64) -> DashboardCounts {
    let mut out = DashboardCounts {
        unassigned,
        ..Default::default()
    };
    for (status, n) in counts {
        match status {
            ReviewStatus::UnderReview => out.under_review += n,
            ReviewStatus::Modified => out.modified += n,
            ReviewStatus::Approved => out.approved += n,
            ReviewStatus::Rejected => out.rejected += n,
            // Assigned rows never sit in pending.
            ReviewStatus::Pending => {}
        }
    }
    out
}

fn queue_items(conn: &Connection, recs: &[Recommendation]) -> Result<Vec<QueueItem>, ApiError> {
    let mut items = Vec::with_capacity(recs.len());
    for rec in recs {
        let report = get_health_report(conn, &rec.report_id)?;
        let patient = get_user(conn, &rec.patient_id)?;
        items.push(QueueItem::new(rec, report.as_ref(), patient.as_ref()));
    }
    Ok(items)
}

fn notify_patient(ctx: &ApiContext, conn: &Connection, rec: &Recommendation) -> Result<(), ApiError> {
    let notifier = ctx.core.notifier();
    if let Some(patient) = get_user(conn, &rec.patient_id)? {
        if let Some(email) = notifier.review_decision(&patient, rec) {
            notifier.dispatch(email);
        }
    }
    Ok(())
}

/// `GET /api/doctor-review/dashboard`
pub async fn dashboard(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DashboardResponse>, ApiError> {
    auth.require_doctor()?;
    let conn = ctx.core.open_db()?;

    let counts = tally(
        &count_recommendations_by_status(&conn, &auth.user_id)?,
        count_unassigned_recommendations(&conn)?,
    );
    let open = list_recommendations_for_doctor(&conn, &auth.user_id, &OPEN_STATUSES, 10)?;

    Ok(Json(DashboardResponse {
        counts,
        open: queue_items(&conn, &open)?,
    }))
}

/// `GET /api/doctor-review/pending`
pub async fn pending(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<QueueResponse>, ApiError> {
    auth.require_doctor()?;
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let recs = list_recommendations_for_doctor(&conn, &auth.user_id, &OPEN_STATUSES, query.limit())?;
    Ok(Json(QueueResponse {
        items: queue_items(&conn, &recs)?,
    }))
}

/// `GET /api/doctor-review/unassigned`
pub async fn unassigned(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<QueueResponse>, ApiError> {
    auth.require_doctor()?;
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let recs = list_unassigned_recommendations(&conn, query.limit())?;
    Ok(Json(QueueResponse {
        items: queue_items(&conn, &recs)?,
    }))
}

/// `GET /api/doctor-review/reviewed`
pub async fn reviewed(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<QueueResponse>, ApiError> {
    auth.require_doctor()?;
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let recs = list_reviewed_recommendations(&conn, &auth.user_id, query.limit())?;
    Ok(Json(QueueResponse {
        items: queue_items(&conn, &recs)?,
    }))
}

/// `GET /api/doctor-review/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<DoctorReportView>, ApiError> {
    auth.require_doctor()?;
    let rec_id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;

    let recommendation = review::load_visible(&conn, &auth.caller(), &rec_id)?;
    let report = get_health_report(&conn, &recommendation.report_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Report not found: {}", recommendation.report_id)))?;
    let patient = get_user(&conn, &recommendation.patient_id)?
        .map(|p| PatientSummary::from_user(&p, Utc::now().date_naive()));

    Ok(Json(DoctorReportView {
        report,
        recommendation,
        patient,
    }))
}

/// `GET /api/doctor-review/:id/history`
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    auth.require_doctor()?;
    let rec_id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    let events = review::history(&conn, &auth.caller(), &rec_id)?;
    Ok(Json(HistoryResponse { events }))
}

/// `POST /api/doctor-review/:id/claim`
pub async fn claim(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let rec_id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    let recommendation = review::claim(&conn, &auth.caller(), &rec_id, Utc::now())?;
    Ok(Json(RecommendationResponse { recommendation }))
}

/// `PUT /api/doctor-review/:id`
pub async fn modify(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<ReviewUpdate>, JsonRejection>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let rec_id = parse_id(&id)?;
    let Json(update) = body?;
    let conn = ctx.core.open_db()?;
    let recommendation = review::modify(&conn, &auth.caller(), &rec_id, update, Utc::now())?;
    Ok(Json(RecommendationResponse { recommendation }))
}

/// An empty body means no notes. Anything else must be a valid
/// `ApproveRequest`, so a mistyped field fails instead of vanishing.
fn approve_notes(body: &[u8]) -> Result<Option<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: ApproveRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid approve body: {e}")))?;
    Ok(req.doctor_notes)
}

/// `POST /api/doctor-review/:id/approve`. An empty body is allowed.
pub async fn approve(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let rec_id = parse_id(&id)?;
    let notes = approve_notes(&body)?;
    let conn = ctx.core.open_db()?;
    let recommendation = review::approve(&conn, &auth.caller(), &rec_id, notes, Utc::now())?;
    notify_patient(&ctx, &conn, &recommendation)?;
    Ok(Json(RecommendationResponse { recommendation }))
}

/// `POST /api/doctor-review/:id/reject`
pub async fn reject(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let rec_id = parse_id(&id)?;
    let Json(req) = body?;
    let conn = ctx.core.open_db()?;
    let recommendation = review::reject(&conn, &auth.caller(), &rec_id, &req.reason, Utc::now())?;
    notify_patient(&ctx, &conn, &recommendation)?;
    Ok(Json(RecommendationResponse { recommendation }))
}
