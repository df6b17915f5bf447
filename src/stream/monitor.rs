use super::manager::{ConnectionHealth, LoadRequest, StreamCommand, StreamConnectionManager};
use super::probe::{ProbeReporter, StreamFrame, StreamProbe};
use crate::events::{EventBus, PipelineEvent};
use crate::scheduler::RetryScheduler;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Inputs processed by the monitor task, strictly in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Loaded { attempt_id: u64 },
    Failed { attempt_id: u64, reason: String },
    RetryFired { token: u64 },
    OverrideEndpoint { address: String },
}

/// Point-in-time view of the connection, published after every signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub endpoint: String,
    pub host: String,
    pub health: ConnectionHealth,
    pub latest_attempt: u64,
    pub retry_pending: bool,
}

impl ConnectionSnapshot {
    fn capture(manager: &StreamConnectionManager) -> Self {
        Self {
            endpoint: manager.endpoint().to_string(),
            host: manager.endpoint().host().to_string(),
            health: manager.health(),
            latest_attempt: manager.latest_attempt(),
            retry_pending: manager.has_pending_retry(),
        }
    }

    /// Badge text for the live feed
    pub fn status_line(&self) -> String {
        if self.health.is_connected() {
            format!("LIVE STREAM [{}]", self.host)
        } else if self.health.attempt_count > 0 {
            format!(
                "SYSTEM OFFLINE [{}] Attempt {}",
                self.host, self.health.attempt_count
            )
        } else {
            format!("SYSTEM OFFLINE [{}]", self.host)
        }
    }
}

/// Drives a `StreamConnectionManager` with a real timer and transport.
///
/// The manager lives inside a single task, so its transitions never race;
/// transfers and the retry timer only talk back through the signal channel.
pub struct StreamMonitor<P: StreamProbe> {
    manager: StreamConnectionManager,
    probe: Arc<P>,
    scheduler: RetryScheduler,
    event_bus: EventBus,
    signals_tx: mpsc::UnboundedSender<StreamSignal>,
    signals_rx: mpsc::UnboundedReceiver<StreamSignal>,
    status_tx: watch::Sender<ConnectionSnapshot>,
    frames_tx: Arc<watch::Sender<Option<StreamFrame>>>,
    active_transfer: Option<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl<P: StreamProbe> StreamMonitor<P> {
    /// Start monitoring and issue the first load immediately
    pub fn spawn(
        manager: StreamConnectionManager,
        probe: Arc<P>,
        event_bus: EventBus,
    ) -> StreamMonitorHandle {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionSnapshot::capture(&manager));
        let (frames_tx, frames_rx) = watch::channel(None);
        let cancellation_token = CancellationToken::new();

        let monitor = Self {
            manager,
            probe,
            scheduler: RetryScheduler::new(),
            event_bus,
            signals_tx: signals_tx.clone(),
            signals_rx,
            status_tx,
            frames_tx: Arc::new(frames_tx),
            active_transfer: None,
            cancellation_token: cancellation_token.clone(),
        };

        let task = tokio::spawn(monitor.run());

        StreamMonitorHandle {
            signals: signals_tx,
            status: status_rx,
            frames: frames_rx,
            cancellation_token,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        info!("Stream monitor started for {}", self.manager.endpoint());

        let request = self.manager.request_load();
        self.start_transfer(request);
        self.publish_status();

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                signal = self.signals_rx.recv() => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => break,
                },
            }
        }

        self.scheduler.cancel_pending();
        if let Some(transfer) = self.active_transfer.take() {
            transfer.abort();
        }
        info!("Stream monitor stopped");
    }

    fn handle_signal(&mut self, signal: StreamSignal) {
        let before = self.manager.health();

        match signal {
            StreamSignal::Loaded { attempt_id } => {
                let commands = self.manager.on_load_success(attempt_id);
                self.execute(commands);
            }
            StreamSignal::Failed { attempt_id, reason } => {
                debug!("Attempt {} failed: {}", attempt_id, reason);
                let commands = self.manager.on_load_failure(attempt_id);
                if !commands.is_empty() {
                    self.clear_frame();
                }
                self.execute(commands);
            }
            StreamSignal::RetryFired { token } => {
                if let Some(request) = self.manager.on_retry_fired(token) {
                    self.start_transfer(request);
                }
            }
            StreamSignal::OverrideEndpoint { address } => {
                match self.manager.override_endpoint(&address) {
                    Ok(commands) => {
                        self.clear_frame();
                        self.event_bus.publish(PipelineEvent::EndpointOverridden {
                            endpoint: self.manager.endpoint().to_string(),
                        });
                        self.execute(commands);
                    }
                    Err(e) => debug!("Ignoring manual address {:?}: {}", address, e),
                }
            }
        }

        let after = self.manager.health();
        if after != before {
            self.event_bus.publish(PipelineEvent::StreamStatusChanged {
                connected: after.is_connected(),
                attempt_count: after.attempt_count,
                endpoint: self.manager.endpoint().to_string(),
                timestamp: SystemTime::now(),
            });
        }

        self.publish_status();
    }

    fn execute(&mut self, commands: Vec<StreamCommand>) {
        for command in commands {
            match command {
                StreamCommand::Load(request) => self.start_transfer(request),
                StreamCommand::ArmRetry { token, delay } => {
                    let signals = self.signals_tx.clone();
                    self.scheduler.schedule_after(delay, move || {
                        let _ = signals.send(StreamSignal::RetryFired { token });
                    });
                    self.event_bus.publish(PipelineEvent::RetryScheduled {
                        attempt_count: self.manager.attempt_count(),
                        delay_ms: delay.as_millis() as u64,
                    });
                }
                StreamCommand::CancelRetry => self.scheduler.cancel_pending(),
            }
        }
    }

    /// Begin a transfer, dropping the one it supersedes
    fn start_transfer(&mut self, request: LoadRequest) {
        if let Some(previous) = self.active_transfer.take() {
            previous.abort();
        }

        let reporter = ProbeReporter::new(
            request.attempt_id,
            self.signals_tx.clone(),
            Arc::clone(&self.frames_tx),
        );
        let probe = Arc::clone(&self.probe);

        debug!("Starting load attempt {}", request.attempt_id);
        self.active_transfer = Some(tokio::spawn(async move {
            probe.attach(request.url, reporter).await;
        }));
    }

    /// Drop the last frame once it no longer belongs to a live attempt
    fn clear_frame(&self) {
        self.frames_tx.send_replace(None);
    }

    fn publish_status(&self) {
        self.status_tx
            .send_replace(ConnectionSnapshot::capture(&self.manager));
    }
}

/// Client side of a running `StreamMonitor`
pub struct StreamMonitorHandle {
    signals: mpsc::UnboundedSender<StreamSignal>,
    status: watch::Receiver<ConnectionSnapshot>,
    frames: watch::Receiver<Option<StreamFrame>>,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamMonitorHandle {
    /// Ask the monitor to switch to a manually entered address.
    ///
    /// Returns `false` only when the monitor is no longer running. Invalid
    /// addresses are dropped silently by the monitor.
    pub fn override_endpoint<S: Into<String>>(&self, address: S) -> bool {
        self.signals
            .send(StreamSignal::OverrideEndpoint {
                address: address.into(),
            })
            .is_ok()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.status.clone()
    }

    pub fn latest_frame(&self) -> Option<StreamFrame> {
        self.frames.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<StreamFrame>> {
        self.frames.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the monitor and wait for its task to finish
    pub async fn shutdown(mut self) {
        self.cancellation_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamMonitorHandle {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
