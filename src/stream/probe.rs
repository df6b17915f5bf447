use super::mjpeg::MjpegFrameExtractor;
use super::monitor::StreamSignal;
use crate::config::StreamConfig;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

/// Most recent JPEG image received from the sensor
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub attempt_id: u64,
    pub sequence: u64,
    pub data: Bytes,
    pub received_at: SystemTime,
}

/// Channel through which one load attempt reports back to the monitor.
///
/// Dropping a reporter that never reported a failure counts as a failure,
/// so a transfer that ends for any reason always produces a signal.
#[derive(Debug)]
pub struct ProbeReporter {
    attempt_id: u64,
    signals: mpsc::UnboundedSender<StreamSignal>,
    frames: Arc<watch::Sender<Option<StreamFrame>>>,
    loaded: bool,
    finished: bool,
    sequence: u64,
}

impl ProbeReporter {
    pub(crate) fn new(
        attempt_id: u64,
        signals: mpsc::UnboundedSender<StreamSignal>,
        frames: Arc<watch::Sender<Option<StreamFrame>>>,
    ) -> Self {
        Self {
            attempt_id,
            signals,
            frames,
            loaded: false,
            finished: false,
            sequence: 0,
        }
    }

    pub fn attempt_id(&self) -> u64 {
        self.attempt_id
    }

    /// Report that the resource loaded; only the first call is forwarded
    pub fn loaded(&mut self) {
        if !self.loaded {
            self.loaded = true;
            let _ = self.signals.send(StreamSignal::Loaded {
                attempt_id: self.attempt_id,
            });
        }
    }

    /// Publish a decoded frame; the first frame also counts as the load
    pub fn frame(&mut self, data: Bytes) {
        self.sequence += 1;
        self.frames.send_replace(Some(StreamFrame {
            attempt_id: self.attempt_id,
            sequence: self.sequence,
            data,
            received_at: SystemTime::now(),
        }));
        self.loaded();
    }

    /// Report that the transfer failed or ended
    pub fn failed<S: Into<String>>(mut self, reason: S) {
        self.send_failure(reason.into());
    }

    fn send_failure(&mut self, reason: String) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.signals.send(StreamSignal::Failed {
            attempt_id: self.attempt_id,
            reason,
        });
    }
}

impl Drop for ProbeReporter {
    fn drop(&mut self) {
        self.send_failure("transfer ended".to_string());
    }
}

/// Transport that turns a stream locator into load/failure signals
#[async_trait]
pub trait StreamProbe: Send + Sync + 'static {
    /// Run one load attempt until it fails, reporting through `reporter`
    async fn attach(&self, url: Url, reporter: ProbeReporter);
}

/// Probe that holds an HTTP connection to the sensor's MJPEG resource.
///
/// The attempt counts as loaded once the first complete frame arrives, and
/// fails on a non-2xx answer, on end of body, or when no frame arrives for
/// `stall_timeout`.
pub struct HttpStreamProbe {
    client: Client,
    stall_timeout: Duration,
    max_frame_bytes: usize,
}

impl HttpStreamProbe {
    pub fn new(config: &StreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            stall_timeout: config.stall_timeout(),
            max_frame_bytes: config.max_frame_bytes,
        })
    }
}

#[async_trait]
impl StreamProbe for HttpStreamProbe {
    async fn attach(&self, url: Url, mut reporter: ProbeReporter) {
        let attempt_id = reporter.attempt_id();
        debug!("Attempt {}: connecting to {}", attempt_id, url);

        let mut deadline = Instant::now() + self.stall_timeout;

        let response = match timeout_at(deadline, self.client.get(url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return reporter.failed(format!("request failed: {}", e)),
            Err(_) => return reporter.failed("no response before stall timeout"),
        };

        let status = response.status();
        if !status.is_success() {
            return reporter.failed(format!("sensor answered HTTP {}", status.as_u16()));
        }

        let mut body = response.bytes_stream();
        let mut extractor = MjpegFrameExtractor::new(self.max_frame_bytes);

        loop {
            match timeout_at(deadline, body.next()).await {
                Err(_) => {
                    return reporter.failed(format!(
                        "no frame received for {:?}",
                        self.stall_timeout
                    ))
                }
                Ok(None) => return reporter.failed("stream ended"),
                Ok(Some(Err(e))) => return reporter.failed(format!("stream error: {}", e)),
                Ok(Some(Ok(chunk))) => {
                    for frame in extractor.push(&chunk) {
                        reporter.frame(frame);
                        deadline = Instant::now() + self.stall_timeout;
                    }
                    trace!(
                        "Attempt {}: received {} bytes, {} buffered",
                        attempt_id,
                        chunk.len(),
                        extractor.buffered_bytes()
                    );
                }
            }
        }
    }
}
