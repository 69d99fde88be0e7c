use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{MetricMap, MetricReading, MetricValue};

/// Lowercase and drop everything but letters and digits, so
/// "HbA1c", "hb_a1c" and "HB A1C" compare equal.
pub fn normalize_metric_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// First metric whose normalized key matches one of `aliases`.
pub fn find_metric<'a>(metrics: &'a MetricMap, aliases: &[&str]) -> Option<&'a MetricValue> {
    metrics
        .iter()
        .find(|(key, _)| {
            let key = normalize_metric_key(key);
            aliases.iter().any(|alias| key == *alias)
        })
        .map(|(_, value)| value)
}

/// Finite numeric value of the first matching metric.
pub fn metric_number(metrics: &MetricMap, aliases: &[&str]) -> Option<f64> {
    find_metric(metrics, aliases)
        .and_then(|m| m.value.as_f64())
        .filter(|v| v.is_finite())
}

const NEGATIVE_WORDS: &[&str] = &["negative", "neg", "none", "nil", "normal", "absent", "not detected", "-"];

/// Dipstick-style reading: numbers count when above zero; text counts
/// unless it is one of the usual negative spellings.
pub fn is_positive_reading(reading: &MetricReading) -> bool {
    match reading {
        MetricReading::Number(v) => v.is_finite() && *v > 0.0,
        MetricReading::Text(s) => {
            let s = s.trim().to_lowercase();
            if s.is_empty() {
                return false;
            }
            if let Ok(v) = s.parse::<f64>() {
                return v.is_finite() && v > 0.0;
            }
            !NEGATIVE_WORDS.contains(&s.as_str())
        }
    }
}

/// Reference interval parsed from a lab's free-text range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

static RE_BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:-|–|to)\s*(\d+(?:\.\d+)?)").unwrap()
});
static RE_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:<|<=|≤|up to)\s*(\d+(?:\.\d+)?)").unwrap());
static RE_LOWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:>|>=|≥)\s*(\d+(?:\.\d+)?)").unwrap());

/// Parse "70-99", "3.5 to 5.0 mg/dL", "< 200", ">= 40". Returns `None`
/// for anything else (e.g. "negative").
pub fn parse_reference_range(text: &str) -> Option<ReferenceRange> {
    let lower = text.to_lowercase();
    if let Some(caps) = RE_BETWEEN.captures(&lower) {
        let low: f64 = caps[1].parse().ok()?;
        let high: f64 = caps[2].parse().ok()?;
        if low > high {
            return None;
        }
        return Some(ReferenceRange {
            low: Some(low),
            high: Some(high),
        });
    }
    if let Some(caps) = RE_UPPER.captures(&lower) {
        return Some(ReferenceRange {
            low: None,
            high: Some(caps[1].parse().ok()?),
        });
    }
    if let Some(caps) = RE_LOWER.captures(&lower) {
        return Some(ReferenceRange {
            low: Some(caps[1].parse().ok()?),
            high: None,
        });
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    Low,
    Normal,
    High,
    Unknown,
}

/// Compare a reading with its lab-supplied range.
pub fn classify_against_range(metric: &MetricValue) -> RangeStatus {
    let (Some(value), Some(range)) = (
        metric.value.as_f64().filter(|v| v.is_finite()),
        metric.normal_range.as_deref().and_then(parse_reference_range),
    ) else {
        return RangeStatus::Unknown;
    };
    if range.low.is_some_and(|low| value < low) {
        RangeStatus::Low
    } else if range.high.is_some_and(|high| value > high) {
        RangeStatus::High
    } else {
        RangeStatus::Normal
    }
}
