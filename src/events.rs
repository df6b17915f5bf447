use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events emitted by the acquisition and analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PipelineEvent {
    /// The live stream connection changed status
    StreamStatusChanged {
        connected: bool,
        attempt_count: u32,
        endpoint: String,
        timestamp: SystemTime,
    },
    /// A reconnection attempt has been scheduled
    RetryScheduled { attempt_count: u32, delay_ms: u64 },
    /// The user replaced the stream endpoint
    EndpointOverridden { endpoint: String },
    /// An image was submitted for classification
    AnalysisStarted { file_name: String, bytes: usize },
    /// The classification backend returned a result
    AnalysisCompleted {
        status: String,
        detections: u32,
        danger: bool,
    },
    /// The submission failed; `reason` is the technical detail
    AnalysisFailed { reason: String },
    /// The orchestrator moved to another phase
    PhaseChanged { phase: String },
}

impl PipelineEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PipelineEvent::StreamStatusChanged {
                connected,
                attempt_count,
                endpoint,
                ..
            } => {
                if *connected {
                    format!("Stream connected to {}", endpoint)
                } else {
                    format!(
                        "Stream offline at {} (attempt {})",
                        endpoint, attempt_count
                    )
                }
            }
            PipelineEvent::RetryScheduled {
                attempt_count,
                delay_ms,
            } => format!(
                "Reconnect scheduled in {} ms after {} failed attempt(s)",
                delay_ms, attempt_count
            ),
            PipelineEvent::EndpointOverridden { endpoint } => {
                format!("Stream endpoint set to {}", endpoint)
            }
            PipelineEvent::AnalysisStarted { file_name, bytes } => {
                format!("Analysis started for {} ({} bytes)", file_name, bytes)
            }
            PipelineEvent::AnalysisCompleted {
                status, detections, ..
            } => format!("Analysis completed: {} ({} detections)", status, detections),
            PipelineEvent::AnalysisFailed { reason } => format!("Analysis failed: {}", reason),
            PipelineEvent::PhaseChanged { phase } => format!("Phase changed to {}", phase),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::StreamStatusChanged { .. } => "stream_status_changed",
            PipelineEvent::RetryScheduled { .. } => "retry_scheduled",
            PipelineEvent::EndpointOverridden { .. } => "endpoint_overridden",
            PipelineEvent::AnalysisStarted { .. } => "analysis_started",
            PipelineEvent::AnalysisCompleted { .. } => "analysis_completed",
            PipelineEvent::AnalysisFailed { .. } => "analysis_failed",
            PipelineEvent::PhaseChanged { .. } => "phase_changed",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        Self {
            debug_logging: true,
            ..Self::new(capacity)
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it. Having nobody
    /// listening is normal for a headless run and yields `0`.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        match &event {
            PipelineEvent::StreamStatusChanged { connected, .. } => {
                if *connected {
                    info!("{}", event.description());
                } else {
                    warn!("{}", event.description());
                }
            }
            PipelineEvent::AnalysisFailed { reason } => {
                warn!("Analysis failed: {}", reason);
            }
            PipelineEvent::AnalysisCompleted { .. } | PipelineEvent::EndpointOverridden { .. } => {
                info!("{}", event.description());
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
