//! Health report intake and the report views handed to patients and doctors.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::authorization::patient_visible_suggestions;
use crate::db::repository::{
    insert_health_report, insert_recommendation, list_recommendations_for_patient,
    list_reports_for_patient, mark_report_analyzed,
};
use crate::db::DatabaseError;
use crate::intelligence::{Evaluation, PatientProfile};
use crate::models::enums::{ReportType, ReviewStatus, Urgency};
use crate::models::{
    DoctorSummary, HealthReport, MetricMap, PatientSummary, Recommendation, RiskFactor,
    SuggestionSet, User,
};

/// Metrics per report above this are refused.
pub const MAX_METRICS: usize = 100;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Invalid(String),
}

/// Body of `POST /health-reports/upload`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub report_type: ReportType,
    pub test_date: NaiveDate,
    pub lab_name: Option<String>,
    #[serde(default)]
    pub blood_metrics: Option<MetricMap>,
    #[serde(default)]
    pub urine_metrics: Option<MetricMap>,
    pub notes: Option<String>,
}

/// Validate an upload and build the report it describes.
pub fn build_report(
    req: UploadRequest,
    patient_id: Uuid,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<HealthReport, ReportError> {
    let metrics = match req.report_type {
        ReportType::Blood => req.blood_metrics,
        ReportType::Urine => req.urine_metrics,
    }
    .filter(|m| !m.is_empty())
    .ok_or_else(|| {
        let field = match req.report_type {
            ReportType::Blood => "bloodMetrics",
            ReportType::Urine => "urineMetrics",
        };
        ReportError::Invalid(format!("{field} is required for a {} report", req.report_type))
    })?;

    if metrics.len() > MAX_METRICS {
        return Err(ReportError::Invalid(format!(
            "At most {MAX_METRICS} metrics per report"
        )));
    }
    if metrics.keys().any(|k| k.trim().is_empty()) {
        return Err(ReportError::Invalid("Metric names must not be empty".into()));
    }
    if req.test_date > today {
        return Err(ReportError::Invalid("testDate cannot be in the future".into()));
    }

    Ok(HealthReport {
        id: Uuid::new_v4(),
        patient_id,
        report_type: req.report_type,
        test_date: req.test_date,
        lab_name: req.lab_name.filter(|s| !s.trim().is_empty()),
        metrics,
        notes: req.notes.filter(|s| !s.trim().is_empty()),
        is_analyzed: false,
        created_at: now,
    })
}

/// The coarse profile the rules use.
pub fn patient_profile(user: &User, today: NaiveDate) -> PatientProfile {
    PatientProfile {
        age: user.profile.age_on(today),
        gender: user.profile.gender,
    }
}

/// Persist a report together with its scored recommendation in one
/// transaction, so a report never exists without one.
pub fn store_analyzed_report(
    conn: &Connection,
    mut report: HealthReport,
    evaluation: Evaluation,
    now: DateTime<Utc>,
) -> Result<(HealthReport, Recommendation), DatabaseError> {
    let analysis = evaluation.analysis;
    let rec = Recommendation {
        id: Uuid::new_v4(),
        report_id: report.id,
        patient_id: report.patient_id,
        doctor_id: None,
        ai_suggestions: analysis.suggestions,
        health_score: analysis.health_score,
        urgency: analysis.urgency,
        risk_factors: analysis.risk_factors,
        summary: Some(evaluation.summary),
        doctor_modifications: None,
        final_recommendations: None,
        doctor_notes: None,
        rejection_reason: None,
        review_status: ReviewStatus::Pending,
        created_at: now,
        updated_at: now,
        assigned_at: None,
        reviewed_at: None,
    };

    let tx = conn.unchecked_transaction()?;
    insert_health_report(&tx, &report)?;
    insert_recommendation(&tx, &rec)?;
    mark_report_analyzed(&tx, &report.id)?;
    tx.commit()?;

    report.is_analyzed = true;
    tracing::info!(
        report_id = %report.id,
        health_score = rec.health_score,
        urgency = %rec.urgency,
        llm_assisted = evaluation.llm_assisted,
        "Health report analyzed"
    );
    Ok((report, rec))
}

/// A patient's reports, newest first, each with its recommendation.
pub fn list_patient_reports(
    conn: &Connection,
    patient_id: &Uuid,
    limit: u32,
) -> Result<Vec<(HealthReport, Option<Recommendation>)>, DatabaseError> {
    let reports = list_reports_for_patient(conn, patient_id, limit)?;
    let mut recs: HashMap<Uuid, Recommendation> = list_recommendations_for_patient(conn, patient_id)?
        .into_iter()
        .map(|r| (r.report_id, r))
        .collect();
    Ok(reports
        .into_iter()
        .map(|report| {
            let rec = recs.remove(&report.id);
            (report, rec)
        })
        .collect())
}

/// What a patient may see of a recommendation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecommendationView {
    pub id: Uuid,
    pub review_status: ReviewStatus,
    pub health_score: u8,
    pub urgency: Urgency,
    pub summary: Option<String>,
    pub final_recommendations: Option<SuggestionSet>,
    pub doctor_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub doctor: Option<DoctorSummary>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl PatientRecommendationView {
    pub fn new(rec: &Recommendation, doctor: Option<&User>) -> Self {
        let approved = rec.review_status == ReviewStatus::Approved;
        Self {
            id: rec.id,
            review_status: rec.review_status,
            health_score: rec.health_score,
            urgency: rec.urgency,
            summary: rec.summary.clone(),
            final_recommendations: patient_visible_suggestions(rec).cloned(),
            doctor_notes: rec.doctor_notes.clone().filter(|_| approved),
            rejection_reason: rec.rejection_reason.clone(),
            doctor: doctor.map(DoctorSummary::from),
            reviewed_at: rec.reviewed_at,
        }
    }
}

/// One row of the patient's report list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientReportView {
    #[serde(flatten)]
    pub report: HealthReport,
    pub recommendation: Option<PatientRecommendationView>,
}

/// Full detail for a reviewing doctor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReportView {
    pub report: HealthReport,
    pub recommendation: Recommendation,
    pub patient: Option<PatientSummary>,
}

/// Compact queue entry for doctor dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: Uuid,
    pub report_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub report_type: Option<ReportType>,
    pub test_date: Option<NaiveDate>,
    pub health_score: u8,
    pub urgency: Urgency,
    pub review_status: ReviewStatus,
    pub risk_factors: Vec<RiskFactor>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(rec: &Recommendation, report: Option<&HealthReport>, patient: Option<&User>) -> Self {
        Self {
            id: rec.id,
            report_id: rec.report_id,
            patient_id: rec.patient_id,
            patient_name: patient.map(|p| p.name.clone()),
            report_type: report.map(|r| r.report_type),
            test_date: report.map(|r| r.test_date),
            health_score: rec.health_score,
            urgency: rec.urgency,
            review_status: rec.review_status,
            risk_factors: rec.risk_factors.clone(),
            created_at: rec.created_at,
            assigned_at: rec.assigned_at,
            reviewed_at: rec.reviewed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::testing::{blood_metrics, make_user};
    use crate::db::repository::{get_health_report, get_recommendation_by_report};
    use crate::db::sqlite::open_memory_database;
    use crate::intelligence::rules::analyze;
    use crate::models::enums::UserRole;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn upload(report_type: ReportType, metrics: Option<MetricMap>) -> UploadRequest {
        UploadRequest {
            report_type,
            test_date: NaiveDate::from_ymd_opt(2026, 5, 20).unwrap(),
            lab_name: Some("City Lab".into()),
            blood_metrics: metrics,
            urine_metrics: None,
            notes: Some("   ".into()),
        }
    }

    fn evaluation(report: &HealthReport) -> Evaluation {
        let analysis = analyze(report.report_type, &report.metrics, &PatientProfile::default());
        Evaluation {
            summary: "Summary".into(),
            analysis,
            llm_assisted: false,
        }
    }

    #[test]
    fn upload_deserializes_camel_case() {
        let json = r#"{"reportType":"blood","testDate":"2026-05-20","labName":"Lab",
            "bloodMetrics":{"glucose":{"value":250,"unit":"mg/dL","normalRange":"70-99"}}}"#;
        let req: UploadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.report_type, ReportType::Blood);
        assert!(req.blood_metrics.unwrap().contains_key("glucose"));
    }

    #[test]
    fn metrics_must_match_report_type() {
        let req = upload(ReportType::Urine, Some(blood_metrics(&[("glucose", 90.0)])));
        let err = build_report(req, Uuid::new_v4(), today(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("urineMetrics"));

        let req = upload(ReportType::Blood, Some(MetricMap::new()));
        assert!(build_report(req, Uuid::new_v4(), today(), Utc::now()).is_err());
    }

    #[test]
    fn future_test_date_rejected() {
        let mut req = upload(ReportType::Blood, Some(blood_metrics(&[("glucose", 90.0)])));
        req.test_date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        assert!(build_report(req, Uuid::new_v4(), today(), Utc::now()).is_err());
    }

    #[test]
    fn blank_notes_dropped() {
        let req = upload(ReportType::Blood, Some(blood_metrics(&[("glucose", 90.0)])));
        let report = build_report(req, Uuid::new_v4(), today(), Utc::now()).unwrap();
        assert!(report.notes.is_none());
        assert_eq!(report.lab_name.as_deref(), Some("City Lab"));
    }

    #[test]
    fn store_writes_report_and_recommendation() {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, UserRole::Patient, "p@example.com");
        let req = upload(ReportType::Blood, Some(blood_metrics(&[("glucose", 250.0)])));
        let report = build_report(req, patient.id, today(), Utc::now()).unwrap();
        let eval = evaluation(&report);

        let (report, rec) = store_analyzed_report(&conn, report, eval, Utc::now()).unwrap();
        assert!(report.is_analyzed);
        assert_eq!(rec.urgency, Urgency::High);
        assert_eq!(rec.review_status, ReviewStatus::Pending);

        let stored = get_health_report(&conn, &report.id).unwrap().unwrap();
        assert!(stored.is_analyzed);
        let stored_rec = get_recommendation_by_report(&conn, &report.id).unwrap().unwrap();
        assert_eq!(stored_rec.health_score, 75);
    }

    #[test]
    fn failed_recommendation_leaves_no_report() {
        let conn = open_memory_database().unwrap();
        // Unknown patient violates the foreign key.
        let req = upload(ReportType::Blood, Some(blood_metrics(&[("glucose", 90.0)])));
        let report = build_report(req, Uuid::new_v4(), today(), Utc::now()).unwrap();
        let id = report.id;
        let eval = evaluation(&report);
        assert!(store_analyzed_report(&conn, report, eval, Utc::now()).is_err());
        assert!(get_health_report(&conn, &id).unwrap().is_none());
    }

    #[test]
    fn patient_view_hides_drafts() {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, UserRole::Patient, "p@example.com");
        let req = upload(ReportType::Blood, Some(blood_metrics(&[("glucose", 250.0)])));
        let report = build_report(req, patient.id, today(), Utc::now()).unwrap();
        let eval = evaluation(&report);
        let (_, rec) = store_analyzed_report(&conn, report, eval, Utc::now()).unwrap();

        let view = PatientRecommendationView::new(&rec, None);
        assert!(view.final_recommendations.is_none());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("aiSuggestions").is_none());
        assert!(json.get("doctorModifications").is_none());
        assert_eq!(json["healthScore"], 75);
    }

    #[test]
    fn lists_reports_with_recommendations() {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, UserRole::Patient, "p@example.com");
        for glucose in [90.0, 150.0] {
            let req = upload(ReportType::Blood, Some(blood_metrics(&[("glucose", glucose)])));
            let report = build_report(req, patient.id, today(), Utc::now()).unwrap();
            let eval = evaluation(&report);
            store_analyzed_report(&conn, report, eval, Utc::now()).unwrap();
        }
        let rows = list_patient_reports(&conn, &patient.id, 50).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|(_, rec)| rec.is_some()));
    }

    #[test]
    fn profile_from_user() {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, UserRole::Patient, "p@example.com");
        let profile = patient_profile(&patient, today());
        assert_eq!(profile.age, Some(46));
        assert!(profile.gender.is_some());
    }
}
