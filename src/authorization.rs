//! Who may see a health report and its recommendation.
//!
//! Checked in order, default deny:
//! 1. The patient who uploaded the report → patient view
//! 2. The doctor assigned to its recommendation → doctor view
//! 3. Any doctor, while the recommendation is pending and unassigned → doctor view
//! 4. Everyone else → deny

use uuid::Uuid;

use crate::models::enums::{ReviewStatus, UserRole};
use crate::models::{Recommendation, SuggestionSet};

/// The authenticated party making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// How much of a recommendation the caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Score, urgency, status, and the final recommendations once approved.
    Patient,
    /// Everything, including the engine draft and doctor edits.
    Doctor,
}

/// Why access was granted or denied, for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    OwnReport,
    AssignedDoctor,
    OpenQueue,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub view: View,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(view: View, reason: AccessReason) -> Self {
        Self {
            allowed: true,
            view,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            view: View::Patient,
            reason: AccessReason::Denied,
        }
    }
}

/// Decide access to the report owned by `report_patient_id`.
pub fn check_report_access(
    caller: &Caller,
    report_patient_id: &Uuid,
    recommendation: Option<&Recommendation>,
) -> AccessDecision {
    if caller.role == UserRole::Patient && &caller.user_id == report_patient_id {
        return AccessDecision::allow(View::Patient, AccessReason::OwnReport);
    }

    if caller.role != UserRole::Doctor {
        return AccessDecision::deny();
    }

    match recommendation {
        Some(rec) if rec.doctor_id == Some(caller.user_id) => {
            AccessDecision::allow(View::Doctor, AccessReason::AssignedDoctor)
        }
        Some(rec) if rec.doctor_id.is_none() && rec.review_status == ReviewStatus::Pending => {
            AccessDecision::allow(View::Doctor, AccessReason::OpenQueue)
        }
        _ => AccessDecision::deny(),
    }
}

/// Whether the caller may change the review state of `rec`.
pub fn is_assigned_doctor(caller: &Caller, rec: &Recommendation) -> bool {
    caller.role == UserRole::Doctor && rec.doctor_id == Some(caller.user_id)
}

/// The suggestions a patient may see: nothing until a doctor approves.
pub fn patient_visible_suggestions(rec: &Recommendation) -> Option<&SuggestionSet> {
    if rec.review_status == ReviewStatus::Approved {
        rec.final_recommendations.as_ref()
    } else {
        None
    }
}
