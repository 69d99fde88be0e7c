//! Doctor review workflow over recommendation documents.
//!
//! Status moves only along the transition table below, only the assigned
//! doctor may edit or decide, and every move is written to `review_events`
//! in the same transaction as the status change. The update is a
//! compare-and-set on the previous status and doctor, so two concurrent
//! writers cannot both succeed.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::authorization::{check_report_access, is_assigned_doctor, Caller};
use crate::db::repository::{
    get_health_report, get_recommendation, get_recommendation_by_report, get_user,
    insert_review_event, list_review_events, update_review_state,
};
use crate::db::DatabaseError;
use crate::models::enums::{ReviewStatus, UserRole};
use crate::models::{Recommendation, ReviewEvent, SuggestionSet, User};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Cannot move a recommendation from {from} to {to}")]
    InvalidTransition { from: ReviewStatus, to: ReviewStatus },

    #[error("Recommendation was changed by another request, reload and retry")]
    Conflict,

    #[error("{0}")]
    Invalid(String),
}

/// The server-side transition table.
pub fn can_transition(from: ReviewStatus, to: ReviewStatus) -> bool {
    use ReviewStatus::*;
    matches!(
        (from, to),
        (Pending, UnderReview)
            | (UnderReview, Modified)
            | (UnderReview, Approved)
            | (UnderReview, Rejected)
            | (Modified, Modified)
            | (Modified, Approved)
            | (Modified, Rejected)
    )
}

/// Body of `PUT /doctor-review/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    pub doctor_modifications: Option<SuggestionSet>,
    pub doctor_notes: Option<String>,
}

/// Result of a patient assigning a doctor.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub recommendation: Recommendation,
    pub doctor: User,
}

/// Patient hands their report to a doctor: `pending → under_review`.
pub fn assign(
    conn: &Connection,
    caller: &Caller,
    report_id: &Uuid,
    doctor_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Assignment, ReviewError> {
    if caller.role != UserRole::Patient {
        return Err(ReviewError::Forbidden("Only patients can assign a doctor"));
    }
    let report = get_health_report(conn, report_id)?.ok_or(ReviewError::NotFound {
        entity: "Report",
        id: *report_id,
    })?;
    if report.patient_id != caller.user_id {
        return Err(ReviewError::NotFound {
            entity: "Report",
            id: *report_id,
        });
    }

    let doctor = get_user(conn, doctor_id)?
        .filter(User::is_doctor)
        .ok_or_else(|| ReviewError::Invalid(format!("{doctor_id} is not a registered doctor")))?;

    let current = get_recommendation_by_report(conn, report_id)?.ok_or(ReviewError::NotFound {
        entity: "Recommendation",
        id: *report_id,
    })?;
    if current.doctor_id.is_some() {
        return Err(ReviewError::InvalidTransition {
            from: current.review_status,
            to: ReviewStatus::UnderReview,
        });
    }

    let mut next = current.clone();
    next.doctor_id = Some(doctor.id);
    next.assigned_at = Some(now);
    let recommendation = commit_transition(conn, caller, &current, next, ReviewStatus::UnderReview, None, now)?;

    tracing::info!(
        recommendation_id = %recommendation.id,
        doctor_id = %doctor.id,
        "Recommendation assigned"
    );
    Ok(Assignment {
        recommendation,
        doctor,
    })
}

/// A doctor takes an unassigned pending recommendation.
pub fn claim(
    conn: &Connection,
    caller: &Caller,
    recommendation_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Recommendation, ReviewError> {
    if caller.role != UserRole::Doctor {
        return Err(ReviewError::Forbidden("Only doctors can claim recommendations"));
    }
    let current = load(conn, recommendation_id)?;
    if current.doctor_id.is_some() {
        return Err(ReviewError::Conflict);
    }

    let mut next = current.clone();
    next.doctor_id = Some(caller.user_id);
    next.assigned_at = Some(now);
    let rec = commit_transition(conn, caller, &current, next, ReviewStatus::UnderReview, None, now)?;
    tracing::info!(recommendation_id = %rec.id, doctor_id = %caller.user_id, "Recommendation claimed");
    Ok(rec)
}

/// Save the doctor's edited suggestions and notes: `→ modified`.
pub fn modify(
    conn: &Connection,
    caller: &Caller,
    recommendation_id: &Uuid,
    update: ReviewUpdate,
    now: DateTime<Utc>,
) -> Result<Recommendation, ReviewError> {
    if update.doctor_modifications.is_none() && update.doctor_notes.is_none() {
        return Err(ReviewError::Invalid(
            "Provide doctorModifications or doctorNotes".into(),
        ));
    }
    let current = load_owned(conn, caller, recommendation_id)?;

    let mut next = current.clone();
    if let Some(mods) = update.doctor_modifications {
        next.doctor_modifications = Some(mods);
    }
    if let Some(notes) = update.doctor_notes {
        next.doctor_notes = non_blank(notes);
    }
    commit_transition(conn, caller, &current, next, ReviewStatus::Modified, None, now)
}

/// Finalize: the doctor's edit if there is one, otherwise the engine draft.
pub fn approve(
    conn: &Connection,
    caller: &Caller,
    recommendation_id: &Uuid,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<Recommendation, ReviewError> {
    let current = load_owned(conn, caller, recommendation_id)?;

    let mut next = current.clone();
    next.final_recommendations = Some(
        current
            .doctor_modifications
            .clone()
            .unwrap_or_else(|| current.ai_suggestions.clone()),
    );
    if let Some(notes) = notes.and_then(non_blank) {
        next.doctor_notes = Some(notes);
    }
    next.reviewed_at = Some(now);
    let rec = commit_transition(conn, caller, &current, next, ReviewStatus::Approved, None, now)?;
    tracing::info!(recommendation_id = %rec.id, "Recommendation approved");
    Ok(rec)
}

/// Reject with a mandatory reason.
pub fn reject(
    conn: &Connection,
    caller: &Caller,
    recommendation_id: &Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Recommendation, ReviewError> {
    let reason = non_blank(reason.to_string())
        .ok_or_else(|| ReviewError::Invalid("A rejection reason is required".into()))?;
    let current = load_owned(conn, caller, recommendation_id)?;

    let mut next = current.clone();
    next.rejection_reason = Some(reason.clone());
    next.final_recommendations = None;
    next.reviewed_at = Some(now);
    let rec = commit_transition(conn, caller, &current, next, ReviewStatus::Rejected, Some(reason), now)?;
    tracing::info!(recommendation_id = %rec.id, "Recommendation rejected");
    Ok(rec)
}

/// Transition history, visible to whoever may see the recommendation.
pub fn history(
    conn: &Connection,
    caller: &Caller,
    recommendation_id: &Uuid,
) -> Result<Vec<ReviewEvent>, ReviewError> {
    let rec = load_visible(conn, caller, recommendation_id)?;
    Ok(list_review_events(conn, &rec.id)?)
}

/// Load a recommendation the caller may read, hiding its existence otherwise.
pub fn load_visible(
    conn: &Connection,
    caller: &Caller,
    recommendation_id: &Uuid,
) -> Result<Recommendation, ReviewError> {
    let rec = load(conn, recommendation_id)?;
    if !check_report_access(caller, &rec.patient_id, Some(&rec)).allowed {
        return Err(ReviewError::NotFound {
            entity: "Recommendation",
            id: *recommendation_id,
        });
    }
    Ok(rec)
}

fn load(conn: &Connection, id: &Uuid) -> Result<Recommendation, ReviewError> {
    get_recommendation(conn, id)?.ok_or(ReviewError::NotFound {
        entity: "Recommendation",
        id: *id,
    })
}

fn load_owned(conn: &Connection, caller: &Caller, id: &Uuid) -> Result<Recommendation, ReviewError> {
    let rec = load(conn, id)?;
    if !is_assigned_doctor(caller, &rec) {
        return Err(ReviewError::Forbidden(
            "Only the assigned doctor can change this recommendation",
        ));
    }
    Ok(rec)
}

/// Check the table, write the new state conditioned on the old one, and
/// record the event. All or nothing.
fn commit_transition(
    conn: &Connection,
    caller: &Caller,
    current: &Recommendation,
    mut next: Recommendation,
    to: ReviewStatus,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<Recommendation, ReviewError> {
    let from = current.review_status;
    if !can_transition(from, to) {
        return Err(ReviewError::InvalidTransition { from, to });
    }
    next.review_status = to;
    next.updated_at = now;
    if to != ReviewStatus::Approved {
        next.final_recommendations = None;
    }

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    if !update_review_state(&tx, &next, from, current.doctor_id.as_ref())? {
        return Err(ReviewError::Conflict);
    }
    insert_review_event(
        &tx,
        &ReviewEvent {
            id: Uuid::new_v4(),
            recommendation_id: next.id,
            actor_id: caller.user_id,
            from_status: from,
            to_status: to,
            note,
            created_at: now,
        },
    )?;
    tx.commit().map_err(DatabaseError::from)?;
    Ok(next)
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::db::repository::testing::{make_recommendation, make_report, make_user};
    use crate::db::sqlite::open_memory_database;
    use crate::models::MedicationSuggestion;

    struct Fixture {
        conn: Connection,
        patient: User,
        doctor: User,
        other_doctor: User,
        rec: Recommendation,
    }

    fn setup() -> Fixture {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, UserRole::Patient, "pat@example.com");
        let doctor = make_user(&conn, UserRole::Doctor, "doc@example.com");
        let other_doctor = make_user(&conn, UserRole::Doctor, "doc2@example.com");
        let report = make_report(&conn, patient.id, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
        let rec = make_recommendation(&conn, &report);
        Fixture {
            conn,
            patient,
            doctor,
            other_doctor,
            rec,
        }
    }

    fn caller(user: &User) -> Caller {
        Caller {
            user_id: user.id,
            role: user.role,
        }
    }

    fn assigned(f: &Fixture) -> Recommendation {
        assign(&f.conn, &caller(&f.patient), &f.rec.report_id, &f.doctor.id, Utc::now())
            .unwrap()
            .recommendation
    }

    #[test]
    fn transition_table() {
        use ReviewStatus::*;
        assert!(can_transition(Pending, UnderReview));
        assert!(can_transition(UnderReview, Approved));
        assert!(can_transition(Modified, Modified));
        assert!(!can_transition(Pending, Approved));
        assert!(!can_transition(Approved, Modified));
        assert!(!can_transition(Rejected, Approved));
        assert!(!can_transition(UnderReview, Pending));
        for to in [Pending, UnderReview, Modified, Approved, Rejected] {
            assert!(!can_transition(Approved, to));
            assert!(!can_transition(Rejected, to));
        }
    }

    #[test]
    fn patient_assigns_doctor() {
        let f = setup();
        let rec = assigned(&f);
        assert_eq!(rec.review_status, ReviewStatus::UnderReview);
        assert_eq!(rec.doctor_id, Some(f.doctor.id));
        assert!(rec.assigned_at.is_some());

        let stored = get_recommendation(&f.conn, &rec.id).unwrap().unwrap();
        assert_eq!(stored.review_status, ReviewStatus::UnderReview);
        let events = list_review_events(&f.conn, &rec.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor_id, f.patient.id);
        assert_eq!(events[0].from_status, ReviewStatus::Pending);
    }

    #[test]
    fn assign_rejects_non_doctor_and_foreign_report() {
        let f = setup();
        let err = assign(&f.conn, &caller(&f.patient), &f.rec.report_id, &f.patient.id, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Invalid(_)));

        let stranger = make_user(&f.conn, UserRole::Patient, "other@example.com");
        let err = assign(&f.conn, &caller(&stranger), &f.rec.report_id, &f.doctor.id, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { .. }));
    }

    #[test]
    fn cannot_assign_twice() {
        let f = setup();
        assigned(&f);
        let err = assign(&f.conn, &caller(&f.patient), &f.rec.report_id, &f.other_doctor.id, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidTransition { .. }));
    }

    #[test]
    fn doctor_claims_unassigned() {
        let f = setup();
        let rec = claim(&f.conn, &caller(&f.doctor), &f.rec.id, Utc::now()).unwrap();
        assert_eq!(rec.doctor_id, Some(f.doctor.id));
        let err = claim(&f.conn, &caller(&f.other_doctor), &f.rec.id, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Conflict));
        let err = claim(&f.conn, &caller(&f.patient), &f.rec.id, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));
    }

    #[test]
    fn modify_then_approve_uses_modifications() {
        let f = setup();
        assigned(&f);
        let mods = SuggestionSet {
            medications: vec![MedicationSuggestion {
                name: "Metformin".into(),
                dosage: Some("500 mg".into()),
                frequency: Some("daily".into()),
                reason: "Borderline glucose".into(),
            }],
            ..Default::default()
        };
        let update = ReviewUpdate {
            doctor_modifications: Some(mods.clone()),
            doctor_notes: Some("  Recheck in 3 months ".into()),
        };
        let rec = modify(&f.conn, &caller(&f.doctor), &f.rec.id, update, Utc::now()).unwrap();
        assert_eq!(rec.review_status, ReviewStatus::Modified);
        assert_eq!(rec.doctor_notes.as_deref(), Some("Recheck in 3 months"));
        assert!(rec.final_recommendations.is_none());

        let rec = approve(&f.conn, &caller(&f.doctor), &f.rec.id, None, Utc::now()).unwrap();
        assert_eq!(rec.review_status, ReviewStatus::Approved);
        assert_eq!(rec.final_recommendations, Some(mods));
        assert!(rec.reviewed_at.is_some());

        let events = list_review_events(&f.conn, &rec.id).unwrap();
        let path: Vec<_> = events.iter().map(|e| e.to_status).collect();
        assert_eq!(
            path,
            vec![ReviewStatus::UnderReview, ReviewStatus::Modified, ReviewStatus::Approved]
        );
    }

    #[test]
    fn approve_without_edits_uses_engine_draft() {
        let f = setup();
        assigned(&f);
        let rec = approve(&f.conn, &caller(&f.doctor), &f.rec.id, Some("Looks right".into()), Utc::now()).unwrap();
        assert_eq!(rec.final_recommendations, Some(f.rec.ai_suggestions.clone()));
        assert_eq!(rec.doctor_notes.as_deref(), Some("Looks right"));
    }

    #[test]
    fn only_assigned_doctor_mutates() {
        let f = setup();
        assigned(&f);
        let err = approve(&f.conn, &caller(&f.other_doctor), &f.rec.id, None, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));
        let err = reject(&f.conn, &caller(&f.patient), &f.rec.id, "no", Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));
    }

    #[test]
    fn terminal_states_are_final() {
        let f = setup();
        assigned(&f);
        approve(&f.conn, &caller(&f.doctor), &f.rec.id, None, Utc::now()).unwrap();

        let err = reject(&f.conn, &caller(&f.doctor), &f.rec.id, "changed my mind", Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::InvalidTransition {
                from: ReviewStatus::Approved,
                to: ReviewStatus::Rejected
            }
        ));
        let update = ReviewUpdate {
            doctor_notes: Some("late edit".into()),
            ..Default::default()
        };
        assert!(modify(&f.conn, &caller(&f.doctor), &f.rec.id, update, Utc::now()).is_err());
    }

    #[test]
    fn reject_requires_reason_and_clears_final() {
        let f = setup();
        assigned(&f);
        let err = reject(&f.conn, &caller(&f.doctor), &f.rec.id, "   ", Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Invalid(_)));

        let rec = reject(&f.conn, &caller(&f.doctor), &f.rec.id, "Values implausible, retest", Utc::now()).unwrap();
        assert_eq!(rec.review_status, ReviewStatus::Rejected);
        assert_eq!(rec.rejection_reason.as_deref(), Some("Values implausible, retest"));
        assert!(rec.final_recommendations.is_none());
        let events = list_review_events(&f.conn, &rec.id).unwrap();
        assert_eq!(events.last().unwrap().note.as_deref(), Some("Values implausible, retest"));
    }

    #[test]
    fn cannot_approve_before_review_starts() {
        let f = setup();
        let err = approve(&f.conn, &caller(&f.doctor), &f.rec.id, None, Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));
    }

    #[test]
    fn stale_writer_loses() {
        let f = setup();
        let rec = assigned(&f);
        let mut stale = rec.clone();
        stale.review_status = ReviewStatus::Approved;
        // Another request already moved it on.
        approve(&f.conn, &caller(&f.doctor), &f.rec.id, None, Utc::now()).unwrap();
        let changed = update_review_state(&f.conn, &stale, ReviewStatus::UnderReview, Some(&f.doctor.id)).unwrap();
        assert!(!changed);
    }

    #[test]
    fn empty_update_rejected() {
        let f = setup();
        assigned(&f);
        let err = modify(&f.conn, &caller(&f.doctor), &f.rec.id, ReviewUpdate::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Invalid(_)));
    }

    #[test]
    fn history_hidden_from_unrelated_doctor() {
        let f = setup();
        assigned(&f);
        assert_eq!(history(&f.conn, &caller(&f.doctor), &f.rec.id).unwrap().len(), 1);
        let err = history(&f.conn, &caller(&f.other_doctor), &f.rec.id).unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { .. }));
    }
}
