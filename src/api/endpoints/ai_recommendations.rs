//! Read-only analysis views over stored reports.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext, MAX_LIST_LIMIT};
use crate::authorization::{check_report_access, View};
use crate::db::repository::{get_health_report, get_recommendation_by_report};
use crate::intelligence::insights::{metric_insights, personalized_insights, MetricInsight, PersonalizedInsights};
use crate::models::enums::{ReportType, Urgency};
use crate::models::RiskFactor;
use crate::reports::list_patient_reports;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInsights {
    pub report_id: Uuid,
    pub report_type: ReportType,
    pub metrics: Vec<MetricInsight>,
    pub health_score: Option<u8>,
    pub urgency: Option<Urgency>,
    /// Only reviewing doctors see the engine's risk factors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<Vec<RiskFactor>>,
}

/// `GET /api/ai-recommendations/insights/:reportId`
pub async fn insights(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(report_id): Path<String>,
) -> Result<Json<ReportInsights>, ApiError> {
    let report_id = parse_id(&report_id)?;
    let conn = ctx.core.open_db()?;
    let not_found = || ApiError::NotFound(format!("Report not found: {report_id}"));

    let report = get_health_report(&conn, &report_id)?.ok_or_else(not_found)?;
    let rec = get_recommendation_by_report(&conn, &report_id)?;
    let access = check_report_access(&auth.caller(), &report.patient_id, rec.as_ref());
    if !access.allowed {
        return Err(not_found());
    }

    Ok(Json(ReportInsights {
        report_id,
        report_type: report.report_type,
        metrics: metric_insights(&report),
        health_score: rec.as_ref().map(|r| r.health_score),
        urgency: rec.as_ref().map(|r| r.urgency),
        risk_factors: rec
            .filter(|_| access.view == View::Doctor)
            .map(|r| r.risk_factors),
    }))
}

/// `GET /api/ai-recommendations/personalized`
pub async fn personalized(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<PersonalizedInsights>, ApiError> {
    auth.require_patient()?;
    let conn = ctx.core.open_db()?;
    let entries = list_patient_reports(&conn, &auth.user_id, MAX_LIST_LIMIT)?;
    Ok(Json(personalized_insights(&entries)))
}
