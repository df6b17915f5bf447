use super::client::AnalysisClient;
use super::payload::{ImagePayload, PreviewRef};
use super::result::AnalysisResult;
use crate::error::AnalysisError;
use tracing::{debug, info, warn};

/// Message shown for every failed submission, whatever the cause
pub const FAILURE_MESSAGE: &str = "Failed to process image. Please try again.";

/// Lifecycle of the single analysis request a pipeline owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Selected,
    Submitting,
    Succeeded,
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Idle => "idle",
            RequestState::Selected => "selected",
            RequestState::Submitting => "submitting",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
        }
    }
}

/// Selection, submission and result reconciliation for one image.
///
/// Transitions are synchronous; `submit` is the only async step and holds
/// the pipeline mutably for the duration of the request, so at most one
/// request is in flight.
#[derive(Debug)]
pub struct AnalysisRequestPipeline {
    state: RequestState,
    payload: Option<ImagePayload>,
    preview: Option<PreviewRef>,
    error: Option<String>,
}

impl AnalysisRequestPipeline {
    pub fn new() -> Self {
        Self {
            state: RequestState::Idle,
            payload: None,
            preview: None,
            error: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn payload(&self) -> Option<&ImagePayload> {
        self.payload.as_ref()
    }

    pub fn preview(&self) -> Option<&PreviewRef> {
        self.preview.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether `submit` would issue a request right now
    pub fn can_submit(&self) -> bool {
        self.payload.is_some()
            && matches!(self.state, RequestState::Selected | RequestState::Failed)
    }

    /// Select an image and derive its local preview.
    ///
    /// Ignored while a request is in flight or when the payload is empty.
    pub fn select_file(&mut self, payload: ImagePayload) -> bool {
        if self.state == RequestState::Submitting {
            debug!("Ignoring file selection while a request is in flight");
            return false;
        }
        if payload.is_empty() {
            debug!("Ignoring empty payload {}", payload.file_name());
            return false;
        }

        let preview = PreviewRef::for_payload(&payload);
        info!(
            "Selected {} ({}, {}) as {}",
            payload.file_name(),
            payload.media_type(),
            payload.size_label(),
            preview.uri()
        );

        self.preview = Some(preview);
        self.payload = Some(payload);
        self.error = None;
        self.state = RequestState::Selected;
        true
    }

    /// Discard the selection, preview and any error
    pub fn clear(&mut self) -> bool {
        match self.state {
            RequestState::Idle => false,
            RequestState::Submitting => {
                debug!("Ignoring clear while a request is in flight");
                false
            }
            _ => {
                self.reset();
                true
            }
        }
    }

    /// Return to `Idle` unconditionally
    pub fn reset(&mut self) {
        self.state = RequestState::Idle;
        self.payload = None;
        self.preview = None;
        self.error = None;
    }

    /// Enter `Submitting` and hand out the payload to send.
    ///
    /// Returns `None`, changing nothing, when there is nothing to submit or a
    /// request is already in flight.
    pub fn begin_submit(&mut self) -> Option<ImagePayload> {
        if !self.can_submit() {
            debug!("Submit ignored in state {}", self.state.as_str());
            return None;
        }

        let payload = self.payload.clone()?;
        self.state = RequestState::Submitting;
        self.error = None;
        Some(payload)
    }

    /// Reconcile the outcome of the request started by `begin_submit`.
    ///
    /// A successful result is handed to the caller and not retained here.
    pub fn complete(
        &mut self,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> Option<AnalysisResult> {
        if self.state != RequestState::Submitting {
            debug!("Ignoring completion in state {}", self.state.as_str());
            return None;
        }

        match outcome {
            Ok(result) => {
                info!(
                    "Analysis complete: {} ({} detections, {})",
                    result.status,
                    result.detections,
                    result.confidence_percent()
                );
                self.state = RequestState::Succeeded;
                Some(result)
            }
            Err(e) => {
                warn!("Analysis submission failed: {}", e);
                self.state = RequestState::Failed;
                self.error = Some(FAILURE_MESSAGE.to_string());
                None
            }
        }
    }

    /// Submit the selected image through `client` and wait for the outcome
    pub async fn submit<C>(&mut self, client: &C) -> Option<AnalysisResult>
    where
        C: AnalysisClient + ?Sized,
    {
        let payload = self.begin_submit()?;
        let outcome = client.submit(&payload).await;
        self.complete(outcome)
    }
}

impl Default for AnalysisRequestPipeline {
    fn default() -> Self {
        Self::new()
    }
}
