mod client;
mod payload;
mod pipeline;
mod report;
mod result;
#[cfg(test)]
mod tests;

pub use client::{AnalysisClient, HttpAnalysisClient, UPLOAD_FIELD};
pub use payload::{ImagePayload, PreviewRef};
pub use pipeline::{AnalysisRequestPipeline, RequestState, FAILURE_MESSAGE};
pub use report::{render_history, ReportView};
pub use result::{AnalysisResult, HistoryRecord, Severity};
