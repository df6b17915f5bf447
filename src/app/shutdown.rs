use super::startup::STREAM_COMPONENT;
use super::{ComponentState, PipelineOrchestrator};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

impl PipelineOrchestrator {
    /// Stop the stream monitor; returns the process exit code
    pub async fn shutdown(&mut self) -> i32 {
        info!("Beginning graceful shutdown");

        let Some(monitor) = self.monitor.take() else {
            info!("Nothing to stop");
            return 0;
        };

        self.set_component_state(STREAM_COMPONENT, ComponentState::Stopping)
            .await;

        match timeout(Duration::from_secs(5), monitor.shutdown()).await {
            Ok(()) => {
                self.set_component_state(STREAM_COMPONENT, ComponentState::Stopped)
                    .await;
                info!("Graceful shutdown completed");
                0
            }
            Err(_) => {
                self.set_component_state(STREAM_COMPONENT, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", STREAM_COMPONENT);
                1
            }
        }
    }
}
