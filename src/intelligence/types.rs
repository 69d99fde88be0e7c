use serde::{Deserialize, Serialize};

use crate::models::enums::{Gender, RiskLevel, Urgency};
use crate::models::{RiskFactor, SuggestionSet};

/// The coarse patient facts the rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub age: Option<u32>,
    pub gender: Option<Gender>,
}

/// Output of the rule cascade for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub suggestions: SuggestionSet,
    pub health_score: u8,
    pub urgency: Urgency,
    pub risk_factors: Vec<RiskFactor>,
}

impl Analysis {
    pub fn high_risk_count(&self) -> usize {
        self.risk_factors
            .iter()
            .filter(|r| r.level == RiskLevel::High)
            .count()
    }
}

/// Analysis plus the patient-readable summary that goes with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub analysis: Analysis,
    pub summary: String,
    /// True when the summary came from the language model.
    pub llm_assisted: bool,
}
