use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::enums::ReportType;
use crate::models::MetricMap;

use super::narrative::{build_prompt, rule_summary, sanitize_summary, SYSTEM_PROMPT};
use super::ollama::LlmClient;
use super::rules::analyze;
use super::types::{Analysis, Evaluation, PatientProfile};
use super::IntelligenceError;

/// Rule scoring plus an optional language-model summary.
///
/// The model only rephrases the rule findings; score, urgency and
/// suggestions always come from the rules.
#[derive(Clone)]
pub struct RecommendationEngine {
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    timeout: Duration,
}

impl RecommendationEngine {
    /// Rules only.
    pub fn rules_only() -> Self {
        Self {
            llm: None,
            model: String::new(),
            timeout: Duration::from_secs(0),
        }
    }

    pub fn with_llm(llm: Arc<dyn LlmClient>, model: &str, timeout: Duration) -> Self {
        Self {
            llm: Some(llm),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Synchronous rule pass.
    pub fn analyze(&self, report_type: ReportType, metrics: &MetricMap, profile: &PatientProfile) -> Analysis {
        analyze(report_type, metrics, profile)
    }

    /// Analyze and attach a summary. Never fails: any LLM problem falls
    /// back to the rule summary.
    pub async fn evaluate(
        &self,
        report_type: ReportType,
        metrics: &MetricMap,
        profile: &PatientProfile,
    ) -> Evaluation {
        let analysis = analyze(report_type, metrics, profile);

        if let Some(llm) = &self.llm {
            let start = Instant::now();
            match self.narrate(llm.clone(), report_type, &analysis, profile).await {
                Ok(summary) => {
                    tracing::info!(
                        model = %self.model,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "LLM summary generated"
                    );
                    return Evaluation {
                        analysis,
                        summary,
                        llm_assisted: true,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, model = %self.model, "LLM summary failed, using rule summary");
                }
            }
        }

        let summary = rule_summary(&analysis);
        Evaluation {
            analysis,
            summary,
            llm_assisted: false,
        }
    }

    async fn narrate(
        &self,
        llm: Arc<dyn LlmClient>,
        report_type: ReportType,
        analysis: &Analysis,
        profile: &PatientProfile,
    ) -> Result<String, IntelligenceError> {
        let prompt = build_prompt(report_type, analysis, profile);
        let model = self.model.clone();
        let task = tokio::task::spawn_blocking(move || llm.generate(&model, &prompt, SYSTEM_PROMPT));

        let raw = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| IntelligenceError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| IntelligenceError::Task(e.to_string()))??;

        sanitize_summary(&raw).ok_or(IntelligenceError::EmptyResponse)
    }
}

impl std::fmt::Debug for RecommendationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationEngine")
            .field("llm", &self.llm.is_some())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::ollama::MockLlmClient;
    use crate::models::enums::Urgency;
    use crate::models::{MetricReading, MetricValue};

    fn glucose(v: f64) -> MetricMap {
        let mut m = MetricMap::new();
        m.insert(
            "glucose".into(),
            MetricValue {
                value: MetricReading::Number(v),
                unit: None,
                normal_range: None,
            },
        );
        m
    }

    #[tokio::test]
    async fn rules_only_uses_rule_summary() {
        let engine = RecommendationEngine::rules_only();
        let eval = engine
            .evaluate(ReportType::Blood, &glucose(250.0), &PatientProfile::default())
            .await;
        assert!(!eval.llm_assisted);
        assert_eq!(eval.analysis.urgency, Urgency::High);
        assert!(eval.summary.contains("75/100"));
    }

    #[tokio::test]
    async fn llm_summary_used_when_available() {
        let mock = Arc::new(MockLlmClient::new("Your sugar is high. A doctor will review."));
        let engine = RecommendationEngine::with_llm(mock, "medgemma", Duration::from_secs(5));
        let eval = engine
            .evaluate(ReportType::Blood, &glucose(250.0), &PatientProfile::default())
            .await;
        assert!(eval.llm_assisted);
        assert_eq!(eval.summary, "Your sugar is high. A doctor will review.");
        assert_eq!(eval.analysis.health_score, 75);
    }

    #[tokio::test]
    async fn failing_llm_falls_back() {
        let engine = RecommendationEngine::with_llm(
            Arc::new(MockLlmClient::failing()),
            "medgemma",
            Duration::from_secs(5),
        );
        let eval = engine
            .evaluate(ReportType::Blood, &glucose(90.0), &PatientProfile::default())
            .await;
        assert!(!eval.llm_assisted);
        assert!(eval.summary.starts_with("Your health score is 100/100."));
    }

    #[tokio::test]
    async fn slow_llm_times_out() {
        let slow = MockLlmClient::new("late").with_delay(Duration::from_millis(500));
        let engine = RecommendationEngine::with_llm(Arc::new(slow), "medgemma", Duration::from_millis(50));
        let eval = engine
            .evaluate(ReportType::Blood, &glucose(90.0), &PatientProfile::default())
            .await;
        assert!(!eval.llm_assisted);
    }

    #[tokio::test]
    async fn blank_llm_output_falls_back() {
        let engine = RecommendationEngine::with_llm(
            Arc::new(MockLlmClient::new("```\n```")),
            "medgemma",
            Duration::from_secs(5),
        );
        let eval = engine
            .evaluate(ReportType::Blood, &glucose(90.0), &PatientProfile::default())
            .await;
        assert!(!eval.llm_assisted);
    }
}
