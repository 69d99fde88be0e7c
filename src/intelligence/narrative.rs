//! Patient-readable summary of an analysis: the LLM prompt, the
//! deterministic fallback, and cleanup of model output.

use std::fmt::Write;

use crate::models::enums::{ReportType, RiskLevel, Urgency};

use super::types::{Analysis, PatientProfile};

/// Longest summary kept from the model, in characters.
pub const MAX_SUMMARY_CHARS: usize = 1200;

pub const SYSTEM_PROMPT: &str = "You summarise laboratory results for a patient in plain language. \
Use at most five sentences. Do not name medications, doses, or diagnoses. \
Do not contradict the findings you are given. \
Remind the patient that a doctor will review the results.";

/// Prompt listing the rule findings for the model to rephrase.
pub fn build_prompt(report_type: ReportType, analysis: &Analysis, profile: &PatientProfile) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Report type: {report_type}");
    if let Some(age) = profile.age {
        let _ = writeln!(prompt, "Patient age: {age}");
    }
    if let Some(gender) = profile.gender {
        let _ = writeln!(prompt, "Patient gender: {gender}");
    }
    let _ = writeln!(prompt, "Health score: {}/100", analysis.health_score);
    let _ = writeln!(prompt, "Urgency: {}", analysis.urgency);

    if analysis.risk_factors.is_empty() {
        let _ = writeln!(prompt, "Findings: none outside the usual ranges.");
    } else {
        let _ = writeln!(prompt, "Findings:");
        for risk in &analysis.risk_factors {
            let _ = writeln!(prompt, "- [{}] {}", risk.level, risk.message);
        }
    }

    if !analysis.suggestions.lifestyle.is_empty() {
        let _ = writeln!(prompt, "Lifestyle advice:");
        for tip in &analysis.suggestions.lifestyle {
            let _ = writeln!(prompt, "- {}", tip.recommendation);
        }
    }

    prompt.push_str("\nWrite the summary for the patient.");
    prompt
}

/// Deterministic summary used when no model is configured or it fails.
pub fn rule_summary(analysis: &Analysis) -> String {
    let mut out = format!("Your health score is {}/100. ", analysis.health_score);

    let high = analysis
        .risk_factors
        .iter()
        .filter(|r| r.level == RiskLevel::High)
        .count();
    match analysis.risk_factors.len() {
        0 => out.push_str("All checked values are within the usual ranges. "),
        1 => out.push_str("One value needs attention. "),
        n => {
            let _ = write!(out, "{n} values need attention");
            if high > 0 {
                let _ = write!(out, ", {high} of them significantly");
            }
            out.push_str(". ");
        }
    }

    out.push_str(match analysis.urgency {
        Urgency::High => "Please arrange to see a doctor soon. ",
        Urgency::Medium => "Consider discussing these results with a doctor. ",
        Urgency::Low => "Keep up your current routine. ",
    });
    out.push_str("A doctor will review these suggestions before they are final.");
    out
}

/// Clean up model output: drop code fences, collapse whitespace, cap the
/// length. Returns `None` when nothing usable is left.
pub fn sanitize_summary(raw: &str) -> Option<String> {
    let text = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return Some(text);
    }
    let mut cut: String = text.chars().take(MAX_SUMMARY_CHARS).collect();
    if let Some(idx) = cut.rfind(". ") {
        cut.truncate(idx + 1);
    }
    Some(cut)
}
