use super::payload::ImagePayload;
use super::result::{AnalysisResult, HistoryRecord};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, EndpointError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// Wire client for the classification backend
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Send one image for classification
    async fn submit(
        &self,
        payload: &ImagePayload,
    ) -> std::result::Result<AnalysisResult, AnalysisError>;

    /// Read the backend's record of past analyses, newest first
    async fn fetch_history(&self) -> std::result::Result<Vec<HistoryRecord>, AnalysisError>;
}

/// `AnalysisClient` speaking HTTP to the backend configured in `[analysis]`
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    client: Client,
    base_url: Url,
    upload_url: Url,
    history_url: Url,
}

impl HttpAnalysisClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| EndpointError::Invalid {
            address: config.base_url.clone(),
            details: e.to_string(),
        })?;
        let upload_url = join(&base_url, &config.upload_path)?;
        let history_url = join(&base_url, &config.history_path)?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        info!(
            "Analysis backend: upload {} history {}",
            upload_url, history_url
        );

        Ok(Self {
            client,
            base_url,
            upload_url,
            history_url,
        })
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    pub fn history_url(&self) -> &Url {
        &self.history_url
    }

    /// Make a possibly relative annotated-image reference absolute
    pub fn resolve_image_url(&self, image_url: &str) -> String {
        match self.base_url.join(image_url) {
            Ok(url) => url.to_string(),
            Err(_) => image_url.to_string(),
        }
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
    ) -> std::result::Result<T, AnalysisError> {
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(AnalysisError::Transport)?;
        serde_json::from_slice(&body).map_err(|e| AnalysisError::malformed(e.to_string()))
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn submit(
        &self,
        payload: &ImagePayload,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let part = Part::bytes(payload.bytes().to_vec())
            .file_name(payload.file_name().to_string())
            .mime_str(payload.media_type())
            .map_err(AnalysisError::Transport)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        debug!(
            "Uploading {} ({} bytes) to {}",
            payload.file_name(),
            payload.len(),
            self.upload_url
        );

        let response = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(AnalysisError::Transport)?;

        let mut result: AnalysisResult = Self::read_json(response).await?;
        result.image_url = self.resolve_image_url(&result.image_url);

        Ok(result)
    }

    async fn fetch_history(&self) -> std::result::Result<Vec<HistoryRecord>, AnalysisError> {
        let response = self
            .client
            .get(self.history_url.clone())
            .send()
            .await
            .map_err(AnalysisError::Transport)?;

        let mut records: Vec<HistoryRecord> = Self::read_json(response).await?;
        for record in &mut records {
            record.result.image_url = self.resolve_image_url(&record.result.image_url);
        }

        debug!("Fetched {} history records", records.len());
        Ok(records)
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| {
        EndpointError::Invalid {
            address: format!("{}{}", base, path),
            details: e.to_string(),
        }
        .into()
    })
}
