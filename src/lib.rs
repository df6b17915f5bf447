pub mod analysis;
pub mod app;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod stream;

pub use analysis::{
    AnalysisClient, AnalysisRequestPipeline, AnalysisResult, HistoryRecord, HttpAnalysisClient,
    ImagePayload, ReportView, RequestState, Severity,
};
pub use app::{ComponentState, Phase, PipelineOrchestrator, ShutdownReason};
pub use config::PolyscanConfig;
pub use endpoint::StreamEndpoint;
pub use error::{AnalysisError, EndpointError, PolyscanError, Result};
pub use events::{EventBus, PipelineEvent};
pub use scheduler::RetryScheduler;
pub use stream::{
    ConnectionHealth, ConnectionSnapshot, ConnectionStatus, HttpStreamProbe,
    StreamConnectionManager, StreamMonitor, StreamMonitorHandle, StreamProbe,
};
