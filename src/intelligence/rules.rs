//! Threshold rules over a report's metrics.
//!
//! Each check is independent: it may subtract a fixed penalty from the
//! score, record a risk factor, and add suggestions. Urgency is derived from
//! the risk factors alone, never from the score.

use crate::models::enums::{Gender, ReportType, RiskLevel, SuggestionPriority, Urgency};
use crate::models::{LifestyleSuggestion, MedicationSuggestion, MetricMap, RiskFactor, SuggestionSet};

use super::helpers::{find_metric, is_positive_reading, metric_number};
use super::types::{Analysis, PatientProfile};

const GLUCOSE: &[&str] = &["glucose", "bloodglucose", "fastingglucose"];
const CHOLESTEROL: &[&str] = &["cholesterol", "totalcholesterol"];
const HBA1C: &[&str] = &["hba1c", "a1c"];
const CREATININE: &[&str] = &["creatinine"];
const ALT: &[&str] = &["alt", "sgpt"];
const AST: &[&str] = &["ast", "sgot"];
const HEMOGLOBIN: &[&str] = &["hemoglobin", "haemoglobin", "hb"];

const URINE_PROTEIN: &[&str] = &["protein"];
const URINE_GLUCOSE: &[&str] = &["glucose"];
const URINE_KETONES: &[&str] = &["ketones", "ketone"];
const URINE_BLOOD: &[&str] = &["blood"];
const URINE_PH: &[&str] = &["ph"];

const ALT_LIMIT: f64 = 56.0;
const AST_LIMIT: f64 = 40.0;

const SENIOR_AGE: u32 = 60;
const ADULT_AGE: u32 = 18;

/// Run every rule for the report type and fold the results.
pub fn analyze(report_type: ReportType, metrics: &MetricMap, profile: &PatientProfile) -> Analysis {
    let mut a = Assessment::new();

    match report_type {
        ReportType::Blood => {
            check_hba1c(&mut a, metrics);
            check_glucose(&mut a, metrics);
            check_cholesterol(&mut a, metrics);
            check_creatinine(&mut a, metrics, profile);
            check_liver(&mut a, metrics);
            check_hemoglobin(&mut a, metrics, profile);
        }
        ReportType::Urine => check_urine(&mut a, metrics),
    }

    apply_profile(&mut a, profile);
    a.finish()
}

/// Urgency from risk factors: any high factor or three factors of any
/// level is high.
pub fn derive_urgency(risk_factors: &[RiskFactor]) -> Urgency {
    let high = risk_factors.iter().any(|r| r.level == RiskLevel::High);
    if high || risk_factors.len() >= 3 {
        Urgency::High
    } else if !risk_factors.is_empty() {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

struct Assessment {
    score: i32,
    risks: Vec<RiskFactor>,
    suggestions: SuggestionSet,
}

impl Assessment {
    fn new() -> Self {
        Self {
            score: 100,
            risks: Vec::new(),
            suggestions: SuggestionSet::default(),
        }
    }

    fn penalize(&mut self, points: i32) {
        self.score -= points;
    }

    fn risk(&mut self, metric: &str, level: RiskLevel, value: Option<f64>, message: impl Into<String>) {
        self.risks.push(RiskFactor {
            metric: metric.to_string(),
            level,
            value,
            message: message.into(),
        });
    }

    fn has_risk(&self, metric: &str) -> bool {
        self.risks.iter().any(|r| r.metric == metric)
    }

    fn medication(&mut self, name: &str, dosage: &str, frequency: &str, reason: &str) {
        if self.suggestions.medications.iter().any(|m| m.name == name) {
            return;
        }
        self.suggestions.medications.push(MedicationSuggestion {
            name: name.to_string(),
            dosage: Some(dosage.to_string()),
            frequency: Some(frequency.to_string()),
            reason: reason.to_string(),
        });
    }

    fn lifestyle(&mut self, category: &str, recommendation: &str, priority: SuggestionPriority) {
        if let Some(existing) = self
            .suggestions
            .lifestyle
            .iter_mut()
            .find(|l| l.recommendation == recommendation)
        {
            if priority_rank(priority) > priority_rank(existing.priority) {
                existing.priority = priority;
            }
            return;
        }
        self.suggestions.lifestyle.push(LifestyleSuggestion {
            category: category.to_string(),
            recommendation: recommendation.to_string(),
            priority,
        });
    }

    fn follow_up(&mut self, test: &str) {
        if !self.suggestions.follow_up_tests.iter().any(|t| t == test) {
            self.suggestions.follow_up_tests.push(test.to_string());
        }
    }

    fn finish(self) -> Analysis {
        let urgency = derive_urgency(&self.risks);
        Analysis {
            suggestions: self.suggestions,
            health_score: self.score.clamp(0, 100) as u8,
            urgency,
            risk_factors: self.risks,
        }
    }
}

fn priority_rank(p: SuggestionPriority) -> u8 {
    match p {
        SuggestionPriority::Low => 0,
        SuggestionPriority::Medium => 1,
        SuggestionPriority::High => 2,
    }
}

fn is_male(profile: &PatientProfile) -> bool {
    profile.gender == Some(Gender::Male)
}

fn check_hba1c(a: &mut Assessment, metrics: &MetricMap) {
    let Some(v) = metric_number(metrics, HBA1C) else {
        return;
    };
    if v >= 9.0 {
        a.penalize(20);
        a.risk("hba1c", RiskLevel::High, Some(v), format!("HbA1c of {v}% indicates poorly controlled diabetes"));
        a.medication("Metformin", "500 mg", "twice daily with meals", "Elevated HbA1c");
        a.follow_up("Endocrinology consultation");
        a.lifestyle("diet", "Follow a low-glycemic diet and limit refined sugars", SuggestionPriority::High);
    } else if v >= 6.5 {
        a.penalize(15);
        a.risk("hba1c", RiskLevel::Moderate, Some(v), format!("HbA1c of {v}% is in the diabetic range"));
        a.medication("Metformin", "500 mg", "once daily with a meal", "HbA1c in the diabetic range");
        a.follow_up("Repeat HbA1c in 3 months");
        a.lifestyle("diet", "Follow a low-glycemic diet and limit refined sugars", SuggestionPriority::Medium);
    } else if v >= 5.7 {
        a.penalize(5);
        a.follow_up("Repeat HbA1c in 6 months");
        a.lifestyle("diet", "Reduce sugary drinks and refined carbohydrates", SuggestionPriority::Medium);
    }
}

fn check_glucose(a: &mut Assessment, metrics: &MetricMap) {
    let Some(v) = metric_number(metrics, GLUCOSE) else {
        return;
    };
    if v >= 200.0 {
        a.penalize(25);
        a.risk("glucose", RiskLevel::High, Some(v), format!("Glucose of {v} mg/dL is severely elevated"));
        a.medication("Metformin", "500 mg", "twice daily with meals", "Severely elevated blood glucose");
        a.follow_up("HbA1c");
        a.follow_up("Endocrinology consultation");
        a.lifestyle("diet", "Follow a low-glycemic diet and limit refined sugars", SuggestionPriority::High);
    } else if v >= 126.0 {
        a.penalize(15);
        a.risk("glucose", RiskLevel::Moderate, Some(v), format!("Glucose of {v} mg/dL is in the diabetic range"));
        a.follow_up("HbA1c");
        a.lifestyle("diet", "Follow a low-glycemic diet and limit refined sugars", SuggestionPriority::Medium);
        a.lifestyle("exercise", "Aim for 150 minutes of moderate exercise per week", SuggestionPriority::Medium);
    } else if v >= 100.0 {
        a.penalize(5);
        a.lifestyle("diet", "Reduce sugary drinks and refined carbohydrates", SuggestionPriority::Medium);
        a.lifestyle("exercise", "Aim for 150 minutes of moderate exercise per week", SuggestionPriority::Low);
    } else if v < 70.0 {
        a.penalize(15);
        a.risk("glucose", RiskLevel::Moderate, Some(v), format!("Glucose of {v} mg/dL is below normal"));
        a.follow_up("Repeat fasting glucose");
        a.lifestyle("diet", "Eat regular meals and keep a fast-acting carbohydrate at hand", SuggestionPriority::High);
    }
}

fn check_cholesterol(a: &mut Assessment, metrics: &MetricMap) {
    let Some(v) = metric_number(metrics, CHOLESTEROL) else {
        return;
    };
    if v >= 240.0 {
        a.penalize(15);
        a.risk("cholesterol", RiskLevel::Moderate, Some(v), format!("Total cholesterol of {v} mg/dL is high"));
        a.medication("Atorvastatin", "10 mg", "once daily at night", "High total cholesterol");
        a.follow_up("Full lipid panel");
        a.lifestyle("diet", "Cut saturated fat and add soluble fibre", SuggestionPriority::High);
    } else if v >= 200.0 {
        a.penalize(8);
        a.follow_up("Full lipid panel");
        a.lifestyle("diet", "Cut saturated fat and add soluble fibre", SuggestionPriority::Medium);
    }
}

fn check_creatinine(a: &mut Assessment, metrics: &MetricMap, profile: &PatientProfile) {
    let Some(v) = metric_number(metrics, CREATININE) else {
        return;
    };
    let limit = if is_male(profile) { 1.3 } else { 1.1 };
    if v > 2.0 {
        a.penalize(20);
        a.risk("creatinine", RiskLevel::High, Some(v), format!("Creatinine of {v} mg/dL suggests reduced kidney function"));
        a.follow_up("eGFR and kidney function panel");
        a.follow_up("Nephrology consultation");
        a.lifestyle("hydration", "Stay well hydrated and avoid NSAID painkillers", SuggestionPriority::High);
    } else if v > limit {
        a.penalize(10);
        a.risk("creatinine", RiskLevel::Moderate, Some(v), format!("Creatinine of {v} mg/dL is above normal"));
        a.follow_up("eGFR and kidney function panel");
        a.lifestyle("hydration", "Stay well hydrated and avoid NSAID painkillers", SuggestionPriority::Medium);
    }
}

fn check_liver(a: &mut Assessment, metrics: &MetricMap) {
    let alt = metric_number(metrics, ALT);
    let ast = metric_number(metrics, AST);

    if let Some(v) = alt.filter(|v| *v > ALT_LIMIT) {
        a.penalize(10);
        a.risk("alt", RiskLevel::Moderate, Some(v), format!("ALT of {v} U/L is elevated"));
    }
    if let Some(v) = ast.filter(|v| *v > AST_LIMIT) {
        a.penalize(10);
        a.risk("ast", RiskLevel::Moderate, Some(v), format!("AST of {v} U/L is elevated"));
    }

    let severe = alt.is_some_and(|v| v > 3.0 * ALT_LIMIT) || ast.is_some_and(|v| v > 3.0 * AST_LIMIT);
    if severe {
        a.penalize(10);
        a.risk("liver", RiskLevel::High, None, "Liver enzymes are more than three times the upper limit");
        a.follow_up("Hepatology consultation");
    }

    if a.has_risk("alt") || a.has_risk("ast") {
        a.follow_up("Liver function panel");
        let priority = if severe { SuggestionPriority::High } else { SuggestionPriority::Medium };
        a.lifestyle("alcohol", "Avoid alcohol until liver enzymes are rechecked", priority);
    }
}

fn check_hemoglobin(a: &mut Assessment, metrics: &MetricMap, profile: &PatientProfile) {
    let Some(v) = metric_number(metrics, HEMOGLOBIN) else {
        return;
    };
    let limit = if is_male(profile) { 13.5 } else { 12.0 };
    if v < 8.0 {
        a.penalize(20);
        a.risk("hemoglobin", RiskLevel::High, Some(v), format!("Hemoglobin of {v} g/dL indicates severe anemia"));
        a.follow_up("Complete blood count with iron studies");
        a.follow_up("Hematology consultation");
        a.lifestyle("diet", "Eat iron-rich foods such as legumes, leafy greens and lean red meat", SuggestionPriority::High);
    } else if v < limit {
        a.penalize(10);
        a.risk("hemoglobin", RiskLevel::Moderate, Some(v), format!("Hemoglobin of {v} g/dL is below normal"));
        a.medication("Ferrous sulfate", "325 mg", "once daily", "Low hemoglobin");
        a.follow_up("Complete blood count with iron studies");
        a.lifestyle("diet", "Eat iron-rich foods such as legumes, leafy greens and lean red meat", SuggestionPriority::Medium);
    }
}

fn check_urine(a: &mut Assessment, metrics: &MetricMap) {
    let positive = |aliases: &[&str]| {
        find_metric(metrics, aliases)
            .map(|m| is_positive_reading(&m.value))
            .unwrap_or(false)
    };

    if positive(URINE_PROTEIN) {
        a.penalize(10);
        a.risk("protein", RiskLevel::Moderate, None, "Protein detected in urine");
        a.follow_up("Urine albumin-to-creatinine ratio");
    }
    if positive(URINE_GLUCOSE) {
        a.penalize(10);
        a.risk("urine_glucose", RiskLevel::Moderate, None, "Glucose detected in urine");
        a.follow_up("Fasting blood glucose");
        a.follow_up("HbA1c");
    }
    if positive(URINE_KETONES) {
        a.penalize(10);
        a.risk("ketones", RiskLevel::Moderate, None, "Ketones detected in urine");
        a.follow_up("Fasting blood glucose");
        a.lifestyle("diet", "Eat regular balanced meals and avoid prolonged fasting", SuggestionPriority::Medium);
    }
    if positive(URINE_BLOOD) {
        a.penalize(10);
        a.risk("urine_blood", RiskLevel::Moderate, None, "Blood detected in urine");
        a.follow_up("Repeat urinalysis with microscopy");
    }
    if let Some(ph) = metric_number(metrics, URINE_PH) {
        if !(4.5..=8.0).contains(&ph) {
            a.penalize(5);
            a.follow_up("Repeat urinalysis");
        }
    }
    if !a.risks.is_empty() {
        a.lifestyle("hydration", "Drink at least 2 litres of water a day", SuggestionPriority::Medium);
    }
}

fn apply_profile(a: &mut Assessment, profile: &PatientProfile) {
    if let Some(age) = profile.age {
        if age >= SENIOR_AGE {
            a.follow_up("Regular health screening every 6 months");
            a.lifestyle(
                "exercise",
                "Prefer low-impact exercise such as walking, swimming or cycling",
                SuggestionPriority::Medium,
            );
        }
        if age < ADULT_AGE {
            a.suggestions.medications.clear();
        }
    }
    if a.suggestions.lifestyle.is_empty() {
        a.lifestyle(
            "general",
            "Keep a balanced diet, regular exercise and routine check-ups",
            SuggestionPriority::Low,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricReading, MetricValue};

    fn metrics(pairs: &[(&str, f64)]) -> MetricMap {
        pairs
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    MetricValue {
                        value: MetricReading::Number(*v),
                        unit: None,
                        normal_range: None,
                    },
                )
            })
            .collect()
    }

    fn text_metrics(pairs: &[(&str, &str)]) -> MetricMap {
        pairs
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    MetricValue {
                        value: MetricReading::Text(v.to_string()),
                        unit: None,
                        normal_range: None,
                    },
                )
            })
            .collect()
    }

    fn adult() -> PatientProfile {
        PatientProfile {
            age: Some(40),
            gender: Some(Gender::Female),
        }
    }

    #[test]
    fn normal_panel_scores_full() {
        let m = metrics(&[("glucose", 90.0), ("cholesterol", 180.0), ("hemoglobin", 14.0)]);
        let a = analyze(ReportType::Blood, &m, &adult());
        assert_eq!(a.health_score, 100);
        assert_eq!(a.urgency, Urgency::Low);
        assert!(a.risk_factors.is_empty());
        assert!(a.suggestions.medications.is_empty());
        assert_eq!(a.suggestions.lifestyle.len(), 1);
        assert_eq!(a.suggestions.lifestyle[0].category, "general");
    }

    #[test]
    fn severe_glucose_is_high_urgency() {
        for v in [200.0, 250.0, 600.0] {
            let m = metrics(&[("glucose", v)]);
            let a = analyze(ReportType::Blood, &m, &adult());
            assert_eq!(a.urgency, Urgency::High, "glucose {v}");
            assert_eq!(a.health_score, 75);
            assert_eq!(a.high_risk_count(), 1);
        }
    }

    #[test]
    fn glucose_bands() {
        let a = analyze(ReportType::Blood, &metrics(&[("Fasting_Glucose", 130.0)]), &adult());
        assert_eq!(a.health_score, 85);
        assert_eq!(a.urgency, Urgency::Medium);

        let a = analyze(ReportType::Blood, &metrics(&[("glucose", 110.0)]), &adult());
        assert_eq!(a.health_score, 95);
        assert_eq!(a.urgency, Urgency::Low);
        assert!(a.risk_factors.is_empty());

        let a = analyze(ReportType::Blood, &metrics(&[("glucose", 60.0)]), &adult());
        assert_eq!(a.health_score, 85);
        assert_eq!(a.risk_factors[0].level, RiskLevel::Moderate);
    }

    #[test]
    fn boundaries_are_inclusive_where_stated() {
        let a = analyze(ReportType::Blood, &metrics(&[("glucose", 126.0)]), &adult());
        assert_eq!(a.health_score, 85);
        let a = analyze(ReportType::Blood, &metrics(&[("glucose", 199.99)]), &adult());
        assert_eq!(a.urgency, Urgency::Medium);
        let a = analyze(ReportType::Blood, &metrics(&[("cholesterol", 240.0)]), &adult());
        assert_eq!(a.health_score, 85);
        let a = analyze(ReportType::Blood, &metrics(&[("creatinine", 2.0)]), &adult());
        assert_eq!(a.health_score, 90);
        assert_eq!(a.urgency, Urgency::Medium);
    }

    #[test]
    fn hba1c_and_glucose_share_medication() {
        let m = metrics(&[("HbA1c", 9.5), ("glucose", 250.0)]);
        let a = analyze(ReportType::Blood, &m, &adult());
        assert_eq!(a.health_score, 55);
        let metformin = a
            .suggestions
            .medications
            .iter()
            .filter(|m| m.name == "Metformin")
            .count();
        assert_eq!(metformin, 1);
        let hba1c_tests = a
            .suggestions
            .follow_up_tests
            .iter()
            .filter(|t| t.as_str() == "Endocrinology consultation")
            .count();
        assert_eq!(hba1c_tests, 1);
    }

    #[test]
    fn thresholds_depend_on_gender() {
        let male = PatientProfile {
            age: Some(40),
            gender: Some(Gender::Male),
        };
        let m = metrics(&[("creatinine", 1.2), ("hemoglobin", 13.0)]);
        let a = analyze(ReportType::Blood, &m, &male);
        assert_eq!(a.health_score, 90);
        assert_eq!(a.risk_factors.len(), 1);
        assert_eq!(a.risk_factors[0].metric, "hemoglobin");

        let a = analyze(ReportType::Blood, &m, &PatientProfile::default());
        assert_eq!(a.health_score, 90);
        assert_eq!(a.risk_factors[0].metric, "creatinine");
    }

    #[test]
    fn severe_liver_enzymes_add_single_high_factor() {
        let m = metrics(&[("SGPT", 200.0), ("ast", 150.0)]);
        let a = analyze(ReportType::Blood, &m, &adult());
        assert_eq!(a.health_score, 70);
        let liver: Vec<_> = a.risk_factors.iter().filter(|r| r.metric == "liver").collect();
        assert_eq!(liver.len(), 1);
        assert_eq!(liver[0].level, RiskLevel::High);
        assert_eq!(a.urgency, Urgency::High);
    }

    #[test]
    fn three_moderate_factors_are_high_urgency() {
        let m = metrics(&[("glucose", 130.0), ("cholesterol", 250.0), ("alt", 60.0)]);
        let a = analyze(ReportType::Blood, &m, &adult());
        assert_eq!(a.high_risk_count(), 0);
        assert_eq!(a.risk_factors.len(), 3);
        assert_eq!(a.urgency, Urgency::High);
    }

    #[test]
    fn score_is_clamped() {
        let m = metrics(&[
            ("glucose", 400.0),
            ("hba1c", 12.0),
            ("cholesterol", 300.0),
            ("creatinine", 4.0),
            ("alt", 500.0),
            ("ast", 500.0),
            ("hemoglobin", 6.0),
        ]);
        let a = analyze(ReportType::Blood, &m, &adult());
        assert_eq!(a.health_score, 0);
        assert_eq!(a.urgency, Urgency::High);
    }

    #[test]
    fn score_stays_in_range_for_odd_values() {
        for v in [f64::NAN, f64::INFINITY, -1.0e9, 0.0, 1.0e12] {
            let m = metrics(&[("glucose", v), ("hemoglobin", v), ("creatinine", v)]);
            let a = analyze(ReportType::Blood, &m, &PatientProfile::default());
            assert!(a.health_score <= 100);
        }
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let m = metrics(&[("glucose", f64::NAN)]);
        let a = analyze(ReportType::Blood, &m, &adult());
        assert_eq!(a.health_score, 100);
        assert!(a.risk_factors.is_empty());
    }

    #[test]
    fn urine_positives() {
        let m = text_metrics(&[("protein", "2+"), ("glucose", "negative"), ("ketones", "trace"), ("pH", "9.0")]);
        let a = analyze(ReportType::Urine, &m, &adult());
        assert_eq!(a.health_score, 75);
        assert_eq!(a.risk_factors.len(), 2);
        assert_eq!(a.urgency, Urgency::Medium);
    }

    #[test]
    fn urine_report_ignores_blood_thresholds() {
        let m = metrics(&[("glucose", 0.0), ("ph", 6.0)]);
        let a = analyze(ReportType::Urine, &m, &adult());
        assert_eq!(a.health_score, 100);
    }

    #[test]
    fn seniors_get_screening_and_low_impact_exercise() {
        let senior = PatientProfile {
            age: Some(70),
            gender: None,
        };
        let a = analyze(ReportType::Blood, &metrics(&[("glucose", 90.0)]), &senior);
        assert!(a
            .suggestions
            .follow_up_tests
            .iter()
            .any(|t| t.starts_with("Regular health screening")));
        assert!(a.suggestions.lifestyle.iter().any(|l| l.category == "exercise"));
    }

    #[test]
    fn minors_get_no_medications() {
        let child = PatientProfile {
            age: Some(12),
            gender: None,
        };
        let a = analyze(ReportType::Blood, &metrics(&[("glucose", 250.0)]), &child);
        assert!(a.suggestions.medications.is_empty());
        assert_eq!(a.urgency, Urgency::High);
    }

    #[test]
    fn urgency_from_counts() {
        assert_eq!(derive_urgency(&[]), Urgency::Low);
        let moderate = RiskFactor {
            metric: "x".into(),
            level: RiskLevel::Moderate,
            value: None,
            message: String::new(),
        };
        assert_eq!(derive_urgency(std::slice::from_ref(&moderate)), Urgency::Medium);
        assert_eq!(
            derive_urgency(&[moderate.clone(), moderate.clone(), moderate]),
            Urgency::High
        );
    }
}
