use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

pub fn insert_health_report(conn: &Connection, report: &HealthReport) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO health_reports (id, patient_id, report_type, test_date, lab_name, metrics,
         notes, is_analyzed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            report.id.to_string(),
            report.patient_id.to_string(),
            report.report_type.as_str(),
            report.test_date.to_string(),
            report.lab_name,
            serde_json::to_string(&report.metrics)?,
            report.notes,
            report.is_analyzed as i32,
            report.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_health_report(conn: &Connection, id: &Uuid) -> Result<Option<HealthReport>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, report_type, test_date, lab_name, metrics, notes,
             is_analyzed, created_at
             FROM health_reports WHERE id = ?1",
            params![id.to_string()],
            report_row_from_rusqlite,
        )
        .optional()?;
    row.map(report_from_row).transpose()
}

/// Reports for one patient, newest test first.
pub fn list_reports_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    limit: u32,
) -> Result<Vec<HealthReport>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, report_type, test_date, lab_name, metrics, notes,
         is_analyzed, created_at
         FROM health_reports WHERE patient_id = ?1
         ORDER BY test_date DESC, created_at DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string(), limit], report_row_from_rusqlite)?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(report_from_row(row?)?);
    }
    Ok(reports)
}

/// The only mutation a stored report accepts.
pub fn mark_report_analyzed(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE health_reports SET is_analyzed = 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("HealthReport", id));
    }
    Ok(())
}

struct ReportRow {
    id: String,
    patient_id: String,
    report_type: String,
    test_date: String,
    lab_name: Option<String>,
    metrics: String,
    notes: Option<String>,
    is_analyzed: bool,
    created_at: String,
}

fn report_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ReportRow, rusqlite::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        report_type: row.get(2)?,
        test_date: row.get(3)?,
        lab_name: row.get(4)?,
        metrics: row.get(5)?,
        notes: row.get(6)?,
        is_analyzed: row.get::<_, i32>(7)? != 0,
        created_at: row.get(8)?,
    })
}

fn report_from_row(row: ReportRow) -> Result<HealthReport, DatabaseError> {
    Ok(HealthReport {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        report_type: ReportType::from_str(&row.report_type)?,
        test_date: parse_date(&row.test_date)?,
        lab_name: row.lab_name,
        metrics: serde_json::from_str(&row.metrics)?,
        notes: row.notes,
        is_analyzed: row.is_analyzed,
        created_at: parse_datetime(&row.created_at)?,
    })
}
