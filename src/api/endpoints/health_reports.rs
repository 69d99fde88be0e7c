//! Report upload, listing, detail, and doctor assignment.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext, ListQuery};
use crate::authorization::{check_report_access, View};
use crate::db::repository::{get_health_report, get_recommendation_by_report, get_user};
use crate::models::{HealthReport, PatientSummary};
use crate::reports::{
    build_report, list_patient_reports, patient_profile, store_analyzed_report, DoctorReportView,
    PatientRecommendationView, PatientReportView, UploadRequest,
};
use crate::review;

#[derive(Serialize)]
pub struct UploadResponse {
    pub report: HealthReport,
    pub recommendation: PatientRecommendationView,
}

#[derive(Serialize)]
pub struct ReportListResponse {
    pub reports: Vec<PatientReportView>,
}

/// Detail shape depends on who is asking.
#[derive(Serialize)]
#[serde(untagged)]
pub enum ReportDetail {
    Patient(PatientReportView),
    Doctor(DoctorReportView),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub doctor_id: Uuid,
}

#[derive(Serialize)]
pub struct AssignResponse {
    pub recommendation: PatientRecommendationView,
}

/// `POST /api/health-reports/upload`. Stores the report and its scored
/// recommendation; the engine may call the LLM, so no connection is held
/// across that await.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    auth.require_patient()?;
    let Json(req) = body?;
    let now = Utc::now();
    let today = now.date_naive();

    let patient = {
        let conn = ctx.core.open_db()?;
        get_user(&conn, &auth.user_id)?
    }
    .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;

    let report = build_report(req, patient.id, today, now)?;
    let evaluation = ctx
        .core
        .engine()
        .evaluate(report.report_type, &report.metrics, &patient_profile(&patient, today))
        .await;

    let conn = ctx.core.open_db()?;
    let (report, rec) = store_analyzed_report(&conn, report, evaluation, now)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            report,
            recommendation: PatientRecommendationView::new(&rec, None),
        }),
    ))
}

/// `GET /api/health-reports/patient/reports`
pub async fn patient_reports(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ReportListResponse>, ApiError> {
    auth.require_patient()?;
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;

    let mut reports = Vec::new();
    for (report, rec) in list_patient_reports(&conn, &auth.user_id, query.limit())? {
        let recommendation = match rec {
            Some(rec) => {
                let doctor = match rec.doctor_id {
                    Some(id) => get_user(&conn, &id)?,
                    None => None,
                };
                Some(PatientRecommendationView::new(&rec, doctor.as_ref()))
            }
            None => None,
        };
        reports.push(PatientReportView {
            report,
            recommendation,
        });
    }
    Ok(Json(ReportListResponse { reports }))
}

/// `GET /api/health-reports/:id`
pub async fn get_report(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<ReportDetail>, ApiError> {
    let report_id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    let not_found = || ApiError::NotFound(format!("Report not found: {report_id}"));

    let report = get_health_report(&conn, &report_id)?.ok_or_else(not_found)?;
    let rec = get_recommendation_by_report(&conn, &report_id)?;
    let access = check_report_access(&auth.caller(), &report.patient_id, rec.as_ref());
    if !access.allowed {
        return Err(not_found());
    }

    let detail = match (access.view, rec) {
        (View::Doctor, Some(recommendation)) => {
            let patient = get_user(&conn, &report.patient_id)?
                .map(|p| PatientSummary::from_user(&p, Utc::now().date_naive()));
            ReportDetail::Doctor(DoctorReportView {
                report,
                recommendation,
                patient,
            })
        }
        (_, rec) => {
            let doctor = match rec.as_ref().and_then(|r| r.doctor_id) {
                Some(id) => get_user(&conn, &id)?,
                None => None,
            };
            ReportDetail::Patient(PatientReportView {
                report,
                recommendation: rec.map(|r| PatientRecommendationView::new(&r, doctor.as_ref())),
            })
        }
    };
    Ok(Json(detail))
}

/// `POST /api/health-reports/:id/assign`
pub async fn assign_doctor(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<Json<AssignResponse>, ApiError> {
    let report_id = parse_id(&id)?;
    let Json(req) = body?;
    let conn = ctx.core.open_db()?;

    let assignment = review::assign(&conn, &auth.caller(), &report_id, &req.doctor_id, Utc::now())?;
    let patient_name = get_user(&conn, &auth.user_id)?
        .map(|p| p.name)
        .unwrap_or_default();

    let notifier = ctx.core.notifier();
    notifier.dispatch(notifier.report_assigned(&assignment.doctor, &patient_name, &assignment.recommendation));

    Ok(Json(AssignResponse {
        recommendation: PatientRecommendationView::new(
            &assignment.recommendation,
            Some(&assignment.doctor),
        ),
    }))
}
