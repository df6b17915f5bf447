use crate::error::{PolyscanError, Result};
use bytes::Bytes;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Image selected for analysis: opaque bytes plus their declared media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    file_name: String,
    media_type: String,
    bytes: Bytes,
}

impl ImagePayload {
    pub fn new<N, M>(file_name: N, media_type: M, bytes: Bytes) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read an image from disk.
    ///
    /// The format is sniffed from the content and falls back to the file
    /// extension; empty files and anything that is not an image are refused.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let bytes = Bytes::from(tokio::fs::read(path).await?);
        if bytes.is_empty() {
            return Err(PolyscanError::unsupported_input(display, "file is empty"));
        }

        let format = image::guess_format(&bytes)
            .or_else(|_| ImageFormat::from_path(path))
            .map_err(|_| PolyscanError::unsupported_input(display.as_str(), "not an image"))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| display.clone());
        let media_type = media_type_for(format);

        debug!(
            "Loaded {} ({}, {} bytes)",
            file_name,
            media_type,
            bytes.len()
        );

        Ok(Self::new(file_name, media_type, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size in megabytes with two decimals, e.g. `1.25 MB`
    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.bytes.len() as f64 / (1024.0 * 1024.0))
    }
}

/// Local handle to a selected image, usable for display without contacting
/// the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRef {
    id: Uuid,
    file_name: String,
    media_type: String,
}

impl PreviewRef {
    pub fn for_payload(payload: &ImagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: payload.file_name().to_string(),
            media_type: payload.media_type().to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn uri(&self) -> String {
        format!("preview:{}/{}", self.id, self.file_name)
    }
}

fn media_type_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Avif => "image/avif",
        ImageFormat::Pnm => "image/x-portable-anymap",
        ImageFormat::Tga => "image/x-tga",
        ImageFormat::Hdr => "image/vnd.radiance",
        ImageFormat::OpenExr => "image/x-exr",
        _ => "application/octet-stream",
    }
}
