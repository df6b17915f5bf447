use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Qualitative outcome reported next to the numeric confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Safe,
    Danger,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Safe => "safe",
            Severity::Danger => "danger",
        }
    }

    pub fn is_danger(&self) -> bool {
        matches!(self, Severity::Danger)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one successful classification. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: String,
    pub detections: u32,
    /// Always within `[0.0, 1.0]`; the backend may send it as a string
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    #[serde(rename = "color")]
    pub severity: Severity,
    /// Capture time in epoch seconds
    pub timestamp: i64,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl AnalysisResult {
    /// Confidence as a percentage with one decimal, e.g. `87.3%`
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    pub fn is_danger(&self) -> bool {
        self.severity.is_danger()
    }
}

/// Entry of the backend's analysis history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub result: AnalysisResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl HistoryRecord {
    /// Date shown in the history table, derived from the timestamp when the
    /// backend did not send one
    pub fn display_date(&self) -> String {
        match (&self.date, self.result.captured_at()) {
            (Some(date), _) => date.clone(),
            (None, Some(at)) => at.format("%Y-%m-%d").to_string(),
            (None, None) => "-".to_string(),
        }
    }

    pub fn display_time(&self) -> String {
        match (&self.time, self.result.captured_at()) {
            (Some(time), _) => time.clone(),
            (None, Some(at)) => at.format("%H:%M:%S").to_string(),
            (None, None) => "-".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Number(f64),
    Text(String),
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match RawConfidence::deserialize(deserializer)? {
        RawConfidence::Number(value) => value,
        RawConfidence::Text(text) => text.trim().parse::<f64>().map_err(|_| {
            serde::de::Error::custom(format!("confidence '{}' is not a number", text))
        })?,
    };

    if !(0.0..=1.0).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "confidence {} is outside [0, 1]",
            value
        )));
    }

    Ok(value)
}
