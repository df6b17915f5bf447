use super::result::{AnalysisResult, HistoryRecord, Severity};
use std::fmt;

/// Read-only presentation of a completed analysis
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView {
    pub headline: String,
    pub detections: u32,
    pub confidence: String,
    pub severity: Severity,
    pub captured_at: String,
    pub image_url: String,
    pub engine: Option<String>,
}

impl ReportView {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let captured_at = result
            .captured_at()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            headline: result.status.clone(),
            detections: result.detections,
            confidence: result.confidence_percent(),
            severity: result.severity,
            captured_at,
            image_url: result.image_url.clone(),
            engine: result.engine.clone(),
        }
    }

    /// Styling class for the verdict badge
    pub fn severity_label(&self) -> &'static str {
        match self.severity {
            Severity::Danger => "DANGER",
            Severity::Safe => "SAFE",
        }
    }
}

impl fmt::Display for ReportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.severity_label(), self.headline)?;
        writeln!(f, "  Detections: {}", self.detections)?;
        writeln!(f, "  Confidence: {}", self.confidence)?;
        writeln!(f, "  Captured:   {}", self.captured_at)?;
        if let Some(engine) = &self.engine {
            writeln!(f, "  Engine:     {}", engine)?;
        }
        write!(f, "  Image:      {}", self.image_url)
    }
}

/// Plain-text table of history records
pub fn render_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "No analyses recorded".to_string();
    }

    let mut out = format!(
        "{:<12} {:<10} {:<26} {:>10} {:>10}  {}\n",
        "DATE", "TIME", "STATUS", "DETECTIONS", "CONFIDENCE", "SEVERITY"
    );
    for record in records {
        out.push_str(&format!(
            "{:<12} {:<10} {:<26} {:>10} {:>10}  {}\n",
            record.display_date(),
            record.display_time(),
            record.result.status,
            record.result.detections,
            record.result.confidence_percent(),
            record.result.severity
        ));
    }
    out
}
