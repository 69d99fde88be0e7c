use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ReviewStatus, RiskLevel, SuggestionPriority, Urgency};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationSuggestion {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifestyleSuggestion {
    pub category: String,
    pub recommendation: String,
    pub priority: SuggestionPriority,
}

/// One suggestion tree. A recommendation holds three of these: the engine
/// draft, the doctor's edit, and the approved final version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSet {
    #[serde(default)]
    pub medications: Vec<MedicationSuggestion>,
    #[serde(default)]
    pub lifestyle: Vec<LifestyleSuggestion>,
    #[serde(default)]
    pub follow_up_tests: Vec<String>,
}

impl SuggestionSet {
    pub fn is_empty(&self) -> bool {
        self.medications.is_empty() && self.lifestyle.is_empty() && self.follow_up_tests.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub metric: String,
    pub level: RiskLevel,
    pub value: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub report_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub ai_suggestions: SuggestionSet,
    pub health_score: u8,
    pub urgency: Urgency,
    pub risk_factors: Vec<RiskFactor>,
    pub summary: Option<String>,
    pub doctor_modifications: Option<SuggestionSet>,
    pub final_recommendations: Option<SuggestionSet>,
    pub doctor_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub review_status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// One row of the review audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub actor_id: Uuid,
    pub from_status: ReviewStatus,
    pub to_status: ReviewStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
