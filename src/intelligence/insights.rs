//! Read-side views over stored reports: per-metric flags for one report and
//! score trends across a patient's history.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::enums::{ReviewStatus, SuggestionPriority};
use crate::models::{HealthReport, MetricReading, Recommendation};

use super::helpers::{classify_against_range, RangeStatus};

/// Score change that counts as a trend rather than noise.
pub const TREND_THRESHOLD: i32 = 5;
const MAX_TIPS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInsight {
    pub name: String,
    pub value: MetricReading,
    pub unit: Option<String>,
    pub normal_range: Option<String>,
    pub status: RangeStatus,
}

/// Flag each metric against the lab's own reference range.
pub fn metric_insights(report: &HealthReport) -> Vec<MetricInsight> {
    report
        .metrics
        .iter()
        .map(|(name, metric)| MetricInsight {
            name: name.clone(),
            value: metric.value.clone(),
            unit: metric.unit.clone(),
            normal_range: metric.normal_range.clone(),
            status: classify_against_range(metric),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePoint {
    pub report_id: Uuid,
    pub test_date: NaiveDate,
    pub health_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRisk {
    pub metric: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizedInsights {
    pub report_count: usize,
    pub latest_score: Option<u8>,
    pub trend: Trend,
    /// Oldest first.
    pub score_history: Vec<ScorePoint>,
    pub recurring_risk_factors: Vec<RecurringRisk>,
    pub tips: Vec<String>,
    pub pending_reviews: usize,
}

/// Compare the two most recent scores.
pub fn score_trend(history: &[ScorePoint]) -> Trend {
    let [.., previous, latest] = history else {
        return Trend::InsufficientData;
    };
    let delta = latest.health_score as i32 - previous.health_score as i32;
    if delta >= TREND_THRESHOLD {
        Trend::Improving
    } else if delta <= -TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Aggregate a patient's reports. Recurring risks and tips come from
/// doctor-approved recommendations only; unreviewed engine output stays
/// hidden.
pub fn personalized_insights(entries: &[(HealthReport, Option<Recommendation>)]) -> PersonalizedInsights {
    let mut scored: Vec<(&HealthReport, &Recommendation)> = entries
        .iter()
        .filter_map(|(report, rec)| rec.as_ref().map(|r| (report, r)))
        .collect();
    scored.sort_by(|a, b| {
        a.0.test_date
            .cmp(&b.0.test_date)
            .then(a.0.created_at.cmp(&b.0.created_at))
    });

    let score_history: Vec<ScorePoint> = scored
        .iter()
        .map(|(report, rec)| ScorePoint {
            report_id: report.id,
            test_date: report.test_date,
            health_score: rec.health_score,
        })
        .collect();

    let mut risk_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, rec) in scored
        .iter()
        .filter(|(_, rec)| rec.review_status == ReviewStatus::Approved)
    {
        for risk in &rec.risk_factors {
            *risk_counts.entry(risk.metric.as_str()).or_default() += 1;
        }
    }
    let mut recurring_risk_factors: Vec<RecurringRisk> = risk_counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .map(|(metric, occurrences)| RecurringRisk {
            metric: metric.to_string(),
            occurrences,
        })
        .collect();
    recurring_risk_factors.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

    let pending_reviews = scored
        .iter()
        .filter(|(_, rec)| !rec.review_status.is_terminal())
        .count();

    PersonalizedInsights {
        report_count: entries.len(),
        latest_score: score_history.last().map(|p| p.health_score),
        trend: score_trend(&score_history),
        tips: approved_tips(&scored),
        score_history,
        recurring_risk_factors,
        pending_reviews,
    }
}

/// Lifestyle advice from approved recommendations, newest report first,
/// high priority first, without repeats.
fn approved_tips(scored: &[(&HealthReport, &Recommendation)]) -> Vec<String> {
    let mut candidates: Vec<(SuggestionPriority, usize, &str)> = Vec::new();
    for (age, (_, rec)) in scored.iter().rev().enumerate() {
        if rec.review_status != ReviewStatus::Approved {
            continue;
        }
        let Some(final_set) = &rec.final_recommendations else {
            continue;
        };
        for tip in &final_set.lifestyle {
            candidates.push((tip.priority, age, tip.recommendation.as_str()));
        }
    }
    candidates.sort_by(|a, b| rank(b.0).cmp(&rank(a.0)).then(a.1.cmp(&b.1)));

    let mut tips: Vec<String> = Vec::new();
    for (_, _, text) in candidates {
        if !tips.iter().any(|t| t == text) {
            tips.push(text.to_string());
        }
        if tips.len() == MAX_TIPS {
            break;
        }
    }
    tips
}

fn rank(p: SuggestionPriority) -> u8 {
    match p {
        SuggestionPriority::Low => 0,
        SuggestionPriority::Medium => 1,
        SuggestionPriority::High => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::enums::{ReportType, RiskLevel, Urgency};
    use crate::models::{LifestyleSuggestion, MetricMap, MetricValue, RiskFactor, SuggestionSet};

    fn report(date: &str) -> HealthReport {
        let mut metrics = MetricMap::new();
        metrics.insert(
            "glucose".into(),
            MetricValue {
                value: MetricReading::Number(120.0),
                unit: Some("mg/dL".into()),
                normal_range: Some("70-99".into()),
            },
        );
        metrics.insert(
            "cholesterol".into(),
            MetricValue {
                value: MetricReading::Number(180.0),
                unit: Some("mg/dL".into()),
                normal_range: Some("< 200".into()),
            },
        );
        HealthReport {
            id: Uuid::new_v4(),
            patient_id: Uuid::nil(),
            report_type: ReportType::Blood,
            test_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            lab_name: None,
            metrics,
            notes: None,
            is_analyzed: true,
            created_at: Utc::now(),
        }
    }

    fn rec(report: &HealthReport, score: u8, status: ReviewStatus, risks: &[&str], tips: &[(&str, SuggestionPriority)]) -> Recommendation {
        let lifestyle: Vec<LifestyleSuggestion> = tips
            .iter()
            .map(|(t, p)| LifestyleSuggestion {
                category: "diet".into(),
                recommendation: t.to_string(),
                priority: *p,
            })
            .collect();
        let set = SuggestionSet {
            medications: vec![],
            lifestyle,
            follow_up_tests: vec![],
        };
        let now = Utc::now();
        Recommendation {
            id: Uuid::new_v4(),
            report_id: report.id,
            patient_id: report.patient_id,
            doctor_id: None,
            ai_suggestions: set.clone(),
            health_score: score,
            urgency: Urgency::Low,
            risk_factors: risks
                .iter()
                .map(|m| RiskFactor {
                    metric: m.to_string(),
                    level: RiskLevel::Moderate,
                    value: None,
                    message: String::new(),
                })
                .collect(),
            summary: None,
            doctor_modifications: None,
            final_recommendations: (status == ReviewStatus::Approved).then_some(set),
            doctor_notes: None,
            rejection_reason: None,
            review_status: status,
            created_at: now,
            updated_at: now,
            assigned_at: None,
            reviewed_at: None,
        }
    }

    #[test]
    fn flags_metrics_against_lab_range() {
        let r = report("2026-01-10");
        let flags = metric_insights(&r);
        let glucose = flags.iter().find(|f| f.name == "glucose").unwrap();
        let chol = flags.iter().find(|f| f.name == "cholesterol").unwrap();
        assert_eq!(glucose.status, RangeStatus::High);
        assert_eq!(chol.status, RangeStatus::Normal);
    }

    #[test]
    fn trend_needs_two_scores() {
        let r = report("2026-01-10");
        let one = personalized_insights(&[(r.clone(), Some(rec(&r, 80, ReviewStatus::Pending, &[], &[])))]);
        assert_eq!(one.trend, Trend::InsufficientData);
        assert_eq!(one.latest_score, Some(80));
        assert_eq!(one.pending_reviews, 1);
    }

    #[test]
    fn trend_compares_latest_two_by_test_date() {
        let old = report("2026-01-10");
        let new = report("2026-03-10");
        // Passed newest first; sorted by test date internally.
        let entries = vec![
            (new.clone(), Some(rec(&new, 90, ReviewStatus::Approved, &[], &[]))),
            (old.clone(), Some(rec(&old, 70, ReviewStatus::Approved, &[], &[]))),
        ];
        let insights = personalized_insights(&entries);
        assert_eq!(insights.trend, Trend::Improving);
        assert_eq!(insights.score_history[0].health_score, 70);
        assert_eq!(insights.latest_score, Some(90));

        let history = |a: u8, b: u8| {
            vec![
                ScorePoint { report_id: old.id, test_date: old.test_date, health_score: a },
                ScorePoint { report_id: new.id, test_date: new.test_date, health_score: b },
            ]
        };
        assert_eq!(score_trend(&history(90, 80)), Trend::Declining);
        assert_eq!(score_trend(&history(80, 84)), Trend::Stable);
    }

    #[test]
    fn recurring_risks_and_approved_tips_only() {
        let a = report("2026-01-10");
        let b = report("2026-02-10");
        let c = report("2026-03-10");
        let entries = vec![
            (a.clone(), Some(rec(&a, 80, ReviewStatus::Approved, &["glucose"], &[("Walk daily", SuggestionPriority::Low)]))),
            (b.clone(), Some(rec(&b, 75, ReviewStatus::Approved, &["glucose", "cholesterol"], &[("Cut sugar", SuggestionPriority::High), ("Walk daily", SuggestionPriority::Low)]))),
            (c.clone(), Some(rec(&c, 70, ReviewStatus::UnderReview, &["cholesterol", "glucose"], &[("Unreviewed tip", SuggestionPriority::High)]))),
        ];
        let insights = personalized_insights(&entries);
        assert_eq!(insights.report_count, 3);
        // Only the two approved glucose flags count; the draft's flags do not.
        assert_eq!(
            insights.recurring_risk_factors,
            vec![RecurringRisk {
                metric: "glucose".into(),
                occurrences: 2
            }]
        );
        assert_eq!(insights.tips, vec!["Cut sugar".to_string(), "Walk daily".to_string()]);
        assert_eq!(insights.pending_reviews, 1);
    }

    #[test]
    fn reports_without_recommendation_still_counted() {
        let r = report("2026-01-10");
        let insights = personalized_insights(&[(r, None)]);
        assert_eq!(insights.report_count, 1);
        assert!(insights.score_history.is_empty());
        assert_eq!(insights.latest_score, None);
    }
}
