use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

/// An image as received from the client, before any validation.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Image hosting is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upload failed: {0}")]
    Rejected(String),
    #[error("Upload response carried an invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Stores `file` under `folder` and returns its public HTTPS URL.
    async fn upload(&self, file: &ImageFile, folder: &str) -> Result<Url, UploadError>;
}

/// Unsigned uploads to a Cloudinary account.
#[derive(Clone)]
pub struct CloudinaryUploader {
    client: reqwest::Client,
    api_url: Arc<Url>,
    cloud_name: Option<String>,
    upload_preset: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Deserialize)]
struct UploadErrorResponse {
    error: Option<UploadErrorDetail>,
}

#[derive(Deserialize)]
struct UploadErrorDetail {
    message: String,
}

impl CloudinaryUploader {
    pub fn new(api_url: Url, cloud_name: Option<String>, upload_preset: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: Arc::new(api_url),
            cloud_name: cloud_name.filter(|name| !name.trim().is_empty()),
            upload_preset,
        }
    }

    fn endpoint(&self, cloud_name: &str) -> Result<Url, UploadError> {
        Ok(self
            .api_url
            .join(&format!("v1_1/{cloud_name}/image/upload"))?)
    }
}

#[async_trait]
impl AssetUploader for CloudinaryUploader {
    async fn upload(&self, file: &ImageFile, folder: &str) -> Result<Url, UploadError> {
        let cloud_name = self
            .cloud_name
            .as_deref()
            .ok_or(UploadError::NotConfigured("cloud name is missing"))?;

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", folder.to_string());

        debug!(folder, file = %file.file_name, size = file.bytes.len(), "uploading image");
        let response = self
            .client
            .post(self.endpoint(cloud_name)?)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<UploadErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .map(|detail| detail.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            error!(%status, %message, "image upload rejected");
            return Err(UploadError::Rejected(message));
        }

        let body: UploadResponse = response.json().await?;
        Ok(Url::parse(&body.secure_url)?)
    }
}
