use std::str::FromStr;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_datetime, parse_datetime_opt, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const RECOMMENDATION_COLUMNS: &str = "id, report_id, patient_id, doctor_id, ai_suggestions,
     health_score, urgency, risk_factors, summary, doctor_modifications, final_recommendations,
     doctor_notes, rejection_reason, review_status, created_at, updated_at, assigned_at, reviewed_at";

/// Open queue ordering: most urgent first, then oldest first.
const QUEUE_ORDER: &str = "ORDER BY CASE urgency WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
     created_at ASC";

pub fn insert_recommendation(conn: &Connection, rec: &Recommendation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO recommendations (id, report_id, patient_id, doctor_id, ai_suggestions,
         health_score, urgency, risk_factors, summary, doctor_modifications, final_recommendations,
         doctor_notes, rejection_reason, review_status, created_at, updated_at, assigned_at,
         reviewed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            rec.id.to_string(),
            rec.report_id.to_string(),
            rec.patient_id.to_string(),
            rec.doctor_id.map(|id| id.to_string()),
            serde_json::to_string(&rec.ai_suggestions)?,
            rec.health_score,
            rec.urgency.as_str(),
            serde_json::to_string(&rec.risk_factors)?,
            rec.summary,
            rec.doctor_modifications.as_ref().map(serde_json::to_string).transpose()?,
            rec.final_recommendations.as_ref().map(serde_json::to_string).transpose()?,
            rec.doctor_notes,
            rec.rejection_reason,
            rec.review_status.as_str(),
            rec.created_at.to_rfc3339(),
            rec.updated_at.to_rfc3339(),
            rec.assigned_at.map(|t| t.to_rfc3339()),
            rec.reviewed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn get_recommendation(conn: &Connection, id: &Uuid) -> Result<Option<Recommendation>, DatabaseError> {
    let sql = format!("SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], rec_row_from_rusqlite)
        .optional()?;
    row.map(rec_from_row).transpose()
}

pub fn get_recommendation_by_report(
    conn: &Connection,
    report_id: &Uuid,
) -> Result<Option<Recommendation>, DatabaseError> {
    let sql = format!("SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE report_id = ?1");
    let row = conn
        .query_row(&sql, params![report_id.to_string()], rec_row_from_rusqlite)
        .optional()?;
    row.map(rec_from_row).transpose()
}

/// Write the review fields of `rec`, but only if the stored row still has
/// `expected_status` and `expected_doctor`. Returns `false` when another
/// writer got there first.
pub fn update_review_state(
    conn: &Connection,
    rec: &Recommendation,
    expected_status: ReviewStatus,
    expected_doctor: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE recommendations SET doctor_id = ?3, doctor_modifications = ?4,
         final_recommendations = ?5, doctor_notes = ?6, rejection_reason = ?7,
         review_status = ?8, updated_at = ?9, assigned_at = ?10, reviewed_at = ?11
         WHERE id = ?1 AND review_status = ?2 AND doctor_id IS ?12",
        params![
            rec.id.to_string(),
            expected_status.as_str(),
            rec.doctor_id.map(|id| id.to_string()),
            rec.doctor_modifications.as_ref().map(serde_json::to_string).transpose()?,
            rec.final_recommendations.as_ref().map(serde_json::to_string).transpose()?,
            rec.doctor_notes,
            rec.rejection_reason,
            rec.review_status.as_str(),
            rec.updated_at.to_rfc3339(),
            rec.assigned_at.map(|t| t.to_rfc3339()),
            rec.reviewed_at.map(|t| t.to_rfc3339()),
            expected_doctor.map(|id| id.to_string()),
        ],
    )?;
    Ok(changed == 1)
}

/// Recommendations assigned to `doctor_id` whose status is in `statuses`.
pub fn list_recommendations_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
    statuses: &[ReviewStatus],
    limit: u32,
) -> Result<Vec<Recommendation>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (0..statuses.len())
        .map(|i| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations
         WHERE doctor_id = ?1 AND review_status IN ({placeholders})
         {QUEUE_ORDER}
         LIMIT ?2"
    );

    let mut values: Vec<Value> = vec![
        Value::Text(doctor_id.to_string()),
        Value::Integer(i64::from(limit)),
    ];
    values.extend(statuses.iter().map(|s| Value::Text(s.as_str().to_string())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), rec_row_from_rusqlite)?;

    let mut recs = Vec::new();
    for row in rows {
        recs.push(rec_from_row(row?)?);
    }
    Ok(recs)
}

/// Pending recommendations no doctor has taken yet.
pub fn list_unassigned_recommendations(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<Recommendation>, DatabaseError> {
    let sql = format!(
        "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations
         WHERE doctor_id IS NULL AND review_status = 'pending'
         {QUEUE_ORDER}
         LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit], rec_row_from_rusqlite)?;

    let mut recs = Vec::new();
    for row in rows {
        recs.push(rec_from_row(row?)?);
    }
    Ok(recs)
}

pub fn list_recommendations_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Recommendation>, DatabaseError> {
    let sql = format!(
        "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations
         WHERE patient_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], rec_row_from_rusqlite)?;

    let mut recs = Vec::new();
    for row in rows {
        recs.push(rec_from_row(row?)?);
    }
    Ok(recs)
}

/// Per-status counts of the recommendations assigned to one doctor.
pub fn count_recommendations_by_status(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<(ReviewStatus, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT review_status, COUNT(*) FROM recommendations
         WHERE doctor_id = ?1 GROUP BY review_status",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row?;
        counts.push((ReviewStatus::from_str(&status)?, count));
    }
    Ok(counts)
}

pub fn count_unassigned_recommendations(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM recommendations WHERE doctor_id IS NULL AND review_status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Approved or rejected recommendations of one doctor, most recently decided first.
pub fn list_reviewed_recommendations(
    conn: &Connection,
    doctor_id: &Uuid,
    limit: u32,
) -> Result<Vec<Recommendation>, DatabaseError> {
    let sql = format!(
        "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations
         WHERE doctor_id = ?1 AND review_status IN ('approved', 'rejected')
         ORDER BY reviewed_at DESC, updated_at DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![doctor_id.to_string(), limit], rec_row_from_rusqlite)?;

    let mut recs = Vec::new();
    for row in rows {
        recs.push(rec_from_row(row?)?);
    }
    Ok(recs)
}

struct RecommendationRow {
    id: String,
    report_id: String,
    patient_id: String,
    doctor_id: Option<String>,
    ai_suggestions: String,
    health_score: u8,
    urgency: String,
    risk_factors: String,
    summary: Option<String>,
    doctor_modifications: Option<String>,
    final_recommendations: Option<String>,
    doctor_notes: Option<String>,
    rejection_reason: Option<String>,
    review_status: String,
    created_at: String,
    updated_at: String,
    assigned_at: Option<String>,
    reviewed_at: Option<String>,
}

fn rec_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<RecommendationRow, rusqlite::Error> {
    Ok(RecommendationRow {
        id: row.get(0)?,
        report_id: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_id: row.get(3)?,
        ai_suggestions: row.get(4)?,
        health_score: row.get(5)?,
        urgency: row.get(6)?,
        risk_factors: row.get(7)?,
        summary: row.get(8)?,
        doctor_modifications: row.get(9)?,
        final_recommendations: row.get(10)?,
        doctor_notes: row.get(11)?,
        rejection_reason: row.get(12)?,
        review_status: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        assigned_at: row.get(16)?,
        reviewed_at: row.get(17)?,
    })
}

fn rec_from_row(row: RecommendationRow) -> Result<Recommendation, DatabaseError> {
    Ok(Recommendation {
        id: parse_uuid(&row.id)?,
        report_id: parse_uuid(&row.report_id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        doctor_id: row.doctor_id.as_deref().map(parse_uuid).transpose()?,
        ai_suggestions: serde_json::from_str(&row.ai_suggestions)?,
        health_score: row.health_score,
        urgency: Urgency::from_str(&row.urgency)?,
        risk_factors: serde_json::from_str(&row.risk_factors)?,
        summary: row.summary,
        doctor_modifications: row
            .doctor_modifications
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        final_recommendations: row
            .final_recommendations
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        doctor_notes: row.doctor_notes,
        rejection_reason: row.rejection_reason,
        review_status: ReviewStatus::from_str(&row.review_status)?,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
        assigned_at: parse_datetime_opt(row.assigned_at.as_deref())?,
        reviewed_at: parse_datetime_opt(row.reviewed_at.as_deref())?,
    })
}
