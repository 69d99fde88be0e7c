use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ReportType;

/// A single lab reading. Blood panels are numeric; urinalysis dipsticks
/// often report text such as "negative" or "2+".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricReading {
    Number(f64),
    Text(String),
}

impl MetricReading {
    /// Numeric value, parsing text readings like "5.4" when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricReading::Number(v) => Some(*v),
            MetricReading::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub value: MetricReading,
    pub unit: Option<String>,
    pub normal_range: Option<String>,
}

pub type MetricMap = BTreeMap<String, MetricValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub report_type: ReportType,
    pub test_date: NaiveDate,
    pub lab_name: Option<String>,
    pub metrics: MetricMap,
    pub notes: Option<String>,
    pub is_analyzed: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_accepts_numbers_and_text() {
        let json = r#"{"glucose":{"value":105.5,"unit":"mg/dL","normalRange":"70-99"},
                       "protein":{"value":"trace","unit":null,"normalRange":"negative"}}"#;
        let map: MetricMap = serde_json::from_str(json).unwrap();
        assert_eq!(map["glucose"].value.as_f64(), Some(105.5));
        assert_eq!(map["protein"].value, MetricReading::Text("trace".into()));
        assert_eq!(map["protein"].value.as_f64(), None);
    }

    #[test]
    fn numeric_text_parses() {
        assert_eq!(MetricReading::Text(" 6.1 ".into()).as_f64(), Some(6.1));
    }
}
