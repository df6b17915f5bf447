use super::{PipelineOrchestrator, ShutdownReason};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl PipelineOrchestrator {
    /// Keep the stream monitor running until SIGINT or SIGTERM, then shut down
    pub async fn run_until_signal(&mut self) -> (ShutdownReason, i32) {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        setup_signal_handlers(shutdown_sender);

        let reason = shutdown_receiver
            .await
            .unwrap_or(ShutdownReason::UserRequest);
        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await;
        (reason, exit_code)
    }
}

fn setup_signal_handlers(shutdown_sender: oneshot::Sender<ShutdownReason>) {
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM signal");
                if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }
        });
    }

    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });
}
