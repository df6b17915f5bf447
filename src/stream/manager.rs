use crate::config::StreamConfig;
use crate::endpoint::StreamEndpoint;
use crate::error::EndpointError;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection status of the live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

/// Status plus the number of consecutive failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub status: ConnectionStatus,
    pub attempt_count: u32,
}

impl ConnectionHealth {
    fn initial() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// One load of the stream resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub attempt_id: u64,
    pub url: Url,
}

/// Side effects the driver must carry out after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCommand {
    /// Start loading the given attempt, superseding any earlier one
    Load(LoadRequest),
    /// Arm the retry timer; its firing must be reported with `token`
    ArmRetry { token: u64, delay: Duration },
    /// Disarm the retry timer
    CancelRetry,
}

/// Connection-health state machine for the sensor stream.
///
/// Pure: it never touches the network or a clock-driven timer itself, it
/// only returns the commands a driver has to execute. Every load attempt and
/// every armed retry carries an id, and signals that do not match the
/// current one are dropped.
#[derive(Debug, Clone)]
pub struct StreamConnectionManager {
    endpoint: StreamEndpoint,
    health: ConnectionHealth,
    retry_interval: Duration,
    service_port: u16,
    latest_attempt: u64,
    live_attempt: Option<u64>,
    pending_retry: Option<u64>,
    next_retry_token: u64,
}

impl StreamConnectionManager {
    pub fn new(endpoint: StreamEndpoint, retry_interval: Duration, service_port: u16) -> Self {
        Self {
            endpoint,
            health: ConnectionHealth::initial(),
            retry_interval,
            service_port,
            latest_attempt: 0,
            live_attempt: None,
            pending_retry: None,
            next_retry_token: 0,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self, EndpointError> {
        let endpoint = StreamEndpoint::from_url(&config.default_url)?;
        Ok(Self::new(
            endpoint,
            config.retry_interval(),
            config.service_port,
        ))
    }

    pub fn endpoint(&self) -> &StreamEndpoint {
        &self.endpoint
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    pub fn attempt_count(&self) -> u32 {
        self.health.attempt_count
    }

    pub fn latest_attempt(&self) -> u64 {
        self.latest_attempt
    }

    pub fn has_pending_retry(&self) -> bool {
        self.pending_retry.is_some()
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Issue a new load of the current endpoint with a fresh attempt id
    pub fn request_load(&mut self) -> LoadRequest {
        self.latest_attempt += 1;
        self.live_attempt = Some(self.latest_attempt);

        let url = self
            .endpoint
            .locator_for_attempt(self.latest_attempt, chrono::Utc::now().timestamp_millis());
        debug!("Requesting stream load attempt {}: {}", self.latest_attempt, url);

        LoadRequest {
            attempt_id: self.latest_attempt,
            url,
        }
    }

    /// The stream for `attempt_id` delivered content
    pub fn on_load_success(&mut self, attempt_id: u64) -> Vec<StreamCommand> {
        if self.live_attempt != Some(attempt_id) {
            debug!(
                "Ignoring load signal for superseded attempt {} (current {})",
                attempt_id, self.latest_attempt
            );
            return Vec::new();
        }

        if !self.health.is_connected() {
            info!("Stream connected to {}", self.endpoint);
        }

        self.health = ConnectionHealth {
            status: ConnectionStatus::Connected,
            attempt_count: 0,
        };
        self.pending_retry = None;

        vec![StreamCommand::CancelRetry]
    }

    /// The stream for `attempt_id` failed to load or dropped
    pub fn on_load_failure(&mut self, attempt_id: u64) -> Vec<StreamCommand> {
        if self.live_attempt != Some(attempt_id) {
            debug!(
                "Ignoring failure signal for superseded attempt {} (current {})",
                attempt_id, self.latest_attempt
            );
            return Vec::new();
        }
        self.live_attempt = None;

        self.health = ConnectionHealth {
            status: ConnectionStatus::Disconnected,
            attempt_count: self.health.attempt_count.saturating_add(1),
        };

        self.next_retry_token += 1;
        let token = self.next_retry_token;
        self.pending_retry = Some(token);

        warn!(
            "Stream at {} unavailable (attempt {}), retrying in {:?}",
            self.endpoint, self.health.attempt_count, self.retry_interval
        );

        vec![StreamCommand::ArmRetry {
            token,
            delay: self.retry_interval,
        }]
    }

    /// The retry timer armed with `token` fired
    pub fn on_retry_fired(&mut self, token: u64) -> Option<LoadRequest> {
        if self.pending_retry != Some(token) {
            debug!("Ignoring retry timer {} that is no longer armed", token);
            return None;
        }
        self.pending_retry = None;

        Some(self.request_load())
    }

    /// Replace the endpoint with a manually supplied address.
    ///
    /// On error nothing changes; callers treat that as a silent no-op.
    pub fn override_endpoint(&mut self, raw: &str) -> Result<Vec<StreamCommand>, EndpointError> {
        let endpoint = StreamEndpoint::from_manual(raw, self.service_port)?;
        info!("Stream endpoint overridden: {} -> {}", self.endpoint, endpoint);

        self.endpoint = endpoint;
        self.health = ConnectionHealth::initial();
        self.pending_retry = None;

        let request = self.request_load();
        Ok(vec![StreamCommand::CancelRetry, StreamCommand::Load(request)])
    }
}
