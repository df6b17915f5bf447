use super::{ComponentState, PipelineOrchestrator};
use crate::error::{PolyscanError, Result};
use crate::stream::{HttpStreamProbe, StreamConnectionManager, StreamMonitor, StreamProbe};
use std::sync::Arc;
use tracing::{error, info};

/// Component name of the live stream monitor
pub(super) const STREAM_COMPONENT: &str = "stream";

impl PipelineOrchestrator {
    /// Start the stream monitor over HTTP against the configured sensor
    pub async fn start(&mut self) -> Result<()> {
        let probe = HttpStreamProbe::new(&self.config.stream).map_err(|e| {
            error!("Failed to create stream probe: {}", e);
            e
        })?;
        self.start_with_probe(Arc::new(probe)).await
    }

    /// Start the stream monitor with the given transport
    pub async fn start_with_probe<P: StreamProbe>(&mut self, probe: Arc<P>) -> Result<()> {
        if self.monitor.is_some() {
            return Err(PolyscanError::component(
                STREAM_COMPONENT,
                "stream monitor already running",
            ));
        }

        self.set_component_state(STREAM_COMPONENT, ComponentState::Starting)
            .await;

        let manager = match StreamConnectionManager::from_config(&self.config.stream) {
            Ok(manager) => manager,
            Err(e) => {
                self.set_component_state(STREAM_COMPONENT, ComponentState::Failed)
                    .await;
                error!("Invalid default stream endpoint: {}", e);
                return Err(e.into());
            }
        };

        let endpoint = manager.endpoint().to_string();
        self.monitor = Some(StreamMonitor::spawn(
            manager,
            probe,
            self.event_bus.clone(),
        ));

        self.set_component_state(STREAM_COMPONENT, ComponentState::Running)
            .await;
        info!("Stream monitor started for {}", endpoint);
        Ok(())
    }
}
