use super::types::{ComponentState, Phase};
use crate::analysis::{
    AnalysisClient, AnalysisRequestPipeline, AnalysisResult, ImagePayload, ReportView,
};
use crate::config::PolyscanConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::stream::{ConnectionSnapshot, StreamMonitorHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Sequences the client through intro, acquisition and report.
///
/// The stream monitor and the analysis pipeline are independent: starting a
/// new analysis resets the pipeline and leaves the stream untouched.
pub struct PipelineOrchestrator {
    pub(super) config: PolyscanConfig,
    pub(super) event_bus: EventBus,
    pub(super) client: Arc<dyn AnalysisClient>,

    pub(super) phase: Phase,
    pub(super) pipeline: AnalysisRequestPipeline,
    pub(super) report: Option<AnalysisResult>,
    pub(super) monitor: Option<StreamMonitorHandle>,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PolyscanConfig,
        client: Arc<dyn AnalysisClient>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            event_bus,
            client,
            phase: Phase::Intro,
            pipeline: AnalysisRequestPipeline::new(),
            report: None,
            monitor: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &PolyscanConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn client(&self) -> Arc<dyn AnalysisClient> {
        Arc::clone(&self.client)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pipeline(&self) -> &AnalysisRequestPipeline {
        &self.pipeline
    }

    /// Result shown in the `Reported` phase
    pub fn report(&self) -> Option<&AnalysisResult> {
        self.report.as_ref()
    }

    pub fn report_view(&self) -> Option<ReportView> {
        self.report.as_ref().map(ReportView::from_result)
    }

    pub fn stream(&self) -> Option<&StreamMonitorHandle> {
        self.monitor.as_ref()
    }

    pub fn stream_snapshot(&self) -> Option<ConnectionSnapshot> {
        self.monitor.as_ref().map(StreamMonitorHandle::snapshot)
    }

    /// Forward a manually entered sensor address to the stream monitor
    pub fn override_endpoint(&self, address: &str) -> bool {
        match &self.monitor {
            Some(monitor) => monitor.override_endpoint(address),
            None => {
                debug!("No stream monitor running, ignoring address {:?}", address);
                false
            }
        }
    }

    /// Leave the intro screen
    pub fn begin_acquisition(&mut self) -> bool {
        if self.phase != Phase::Intro {
            return false;
        }
        self.set_phase(Phase::Acquiring);
        true
    }

    pub fn select_file(&mut self, payload: ImagePayload) -> bool {
        if self.phase != Phase::Acquiring {
            debug!("Ignoring file selection in phase {}", self.phase);
            return false;
        }
        self.pipeline.select_file(payload)
    }

    pub fn clear_selection(&mut self) -> bool {
        if self.phase != Phase::Acquiring {
            return false;
        }
        self.pipeline.clear()
    }

    /// Submit the selected image; moves to `Reported` only on success
    pub async fn submit(&mut self) -> bool {
        if self.phase != Phase::Acquiring {
            debug!("Ignoring submit in phase {}", self.phase);
            return false;
        }

        let payload = match self.pipeline.begin_submit() {
            Some(payload) => payload,
            None => return false,
        };

        self.event_bus.publish(PipelineEvent::AnalysisStarted {
            file_name: payload.file_name().to_string(),
            bytes: payload.len(),
        });

        let outcome = self.client.submit(&payload).await;
        let failure = outcome.as_ref().err().map(|e| e.to_string());

        match self.pipeline.complete(outcome) {
            Some(result) => {
                self.event_bus.publish(PipelineEvent::AnalysisCompleted {
                    status: result.status.clone(),
                    detections: result.detections,
                    danger: result.is_danger(),
                });
                self.report = Some(result);
                self.set_phase(Phase::Reported);
                true
            }
            None => {
                self.event_bus.publish(PipelineEvent::AnalysisFailed {
                    reason: failure.unwrap_or_default(),
                });
                false
            }
        }
    }

    /// Discard the report and start over; the stream connection is kept
    pub fn new_analysis(&mut self) -> bool {
        if self.phase != Phase::Reported {
            return false;
        }
        self.pipeline.reset();
        self.report = None;
        self.set_phase(Phase::Acquiring);
        true
    }

    fn set_phase(&mut self, phase: Phase) {
        info!("Phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.event_bus.publish(PipelineEvent::PhaseChanged {
            phase: phase.to_string(),
        });
    }
}
