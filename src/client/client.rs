//! # Client Core
//!
//! This module contains the minimal core client that talks to the remote
//! steganography service over HTTP.
//!
//! ## Responsibility
//!
//! The [`StegoService`] trait covers exactly the three service operations:
//! - `upload`: send the carrier image and receive its analysis
//! - `embed`: send the admitted payload files (and optional password)
//! - `extract`: ask the service to recover files from the carrier
//!
//! ## Design Philosophy
//!
//! This core component is stateless. It does not handle:
//! - Session state or stale responses
//! - Capacity admission
//! - Password retry limits
//! - Busy indication
//!
//! Those concerns are delegated to the
//! [`SessionMiddleware`](super::middleware::SessionMiddleware).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use peekaboo_client::client::client::{HttpStegoClient, StegoService};
//!
//! let service = HttpStegoClient::new(&config.service)?;
//! let analysis = service.upload(&image).await?;
//! ```

use log::{debug, info};
use reqwest::multipart::{Form, Part};
use thiserror::Error;

use crate::common::config::ServiceConfig;
use crate::common::messages::{EmbedResponse, ExtractResponse, MessageError, UploadResponse};
use crate::session::capacity::CandidateFile;
use crate::session::state::{CarrierImage, EmbedBatch};

/// A request that did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A local file meant for the request could not be read.
    #[error("cannot read {path}: {reason}")]
    LocalFile { path: String, reason: String },
}

impl From<MessageError> for TransportError {
    fn from(err: MessageError) -> Self {
        TransportError::Malformed(err.to_string())
    }
}

/// The remote steganography service.
///
/// Implemented over HTTP by [`HttpStegoClient`]; tests substitute scripted
/// services.
#[allow(async_fn_in_trait)]
pub trait StegoService {
    /// Sends the carrier image for analysis.
    async fn upload(&self, image: &CarrierImage) -> Result<UploadResponse, TransportError>;

    /// Embeds the batch into the carrier last uploaded.
    async fn embed(&self, batch: &EmbedBatch) -> Result<EmbedResponse, TransportError>;

    /// Extracts the payload from the carrier last uploaded.
    async fn extract(&self, password: Option<&str>) -> Result<ExtractResponse, TransportError>;
}

/// HTTP implementation of [`StegoService`].
///
/// # Fields
///
/// * `client` - Shared reqwest client with the configured timeout
/// * `base_url` - Service root, without trailing slash
pub struct HttpStegoClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStegoClient {
    /// Creates a client for the configured service.
    ///
    /// # Arguments
    ///
    /// * `config` - Service section of the client configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(config: &ServiceConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a prepared request and returns the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        debug!("Received {} byte response", body.len());
        Ok(body.to_vec())
    }
}

impl StegoService for HttpStegoClient {
    async fn upload(&self, image: &CarrierImage) -> Result<UploadResponse, TransportError> {
        info!("📤 Uploading carrier {} to {}", image.name, self.base_url);

        let part = file_part(&image.path, &image.name, Some(&image.mime_type)).await?;
        let form = Form::new().part("file", part);

        let body = self.send(self.client.post(self.url("/upload")).multipart(form)).await?;
        Ok(UploadResponse::from_slice(&body)?)
    }

    async fn embed(&self, batch: &EmbedBatch) -> Result<EmbedResponse, TransportError> {
        info!(
            "📤 Embedding {} file(s){}",
            batch.files.len(),
            if batch.password.is_some() { " with password" } else { "" }
        );

        let mut form = Form::new();
        for file in &batch.files {
            form = form.part("files", candidate_part(file).await?);
        }
        // the service reads an empty password as "no password"
        form = form.text("password", batch.password.clone().unwrap_or_default());

        let body = self.send(self.client.post(self.url("/embed")).multipart(form)).await?;
        Ok(EmbedResponse::from_slice(&body, batch.files.len())?)
    }

    async fn extract(&self, password: Option<&str>) -> Result<ExtractResponse, TransportError> {
        info!("📤 Requesting extraction");

        let request = self
            .client
            .post(self.url("/extract"))
            .form(&[("password", password.unwrap_or_default())]);

        let body = self.send(request).await?;
        Ok(ExtractResponse::from_slice(&body)?)
    }
}

async fn candidate_part(file: &CandidateFile) -> Result<Part, TransportError> {
    file_part(&file.path, &file.name, None).await
}

async fn file_part(
    path: &std::path::Path,
    name: &str,
    mime: Option<&str>,
) -> Result<Part, TransportError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| TransportError::LocalFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let part = Part::bytes(bytes).file_name(name.to_string());
    match mime {
        Some(mime) => part
            .mime_str(mime)
            .map_err(|e| TransportError::Request(e.to_string())),
        None => Ok(part),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> ServiceConfig {
        ServiceConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 1,
        }
    }

    #[test]
    fn test_base_url_is_normalised() {
        let client = HttpStegoClient::new(&config("http://127.0.0.1:8080/")).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
        assert_eq!(client.url("/upload"), "http://127.0.0.1:8080/upload");
    }

    #[test]
    fn test_message_error_is_malformed() {
        let err = UploadResponse::from_slice(b"not json").unwrap_err();
        assert!(matches!(TransportError::from(err), TransportError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let client = HttpStegoClient::new(&config("http://127.0.0.1:9")).unwrap();
        let image = CarrierImage::new("gone.png", "/definitely/not/here.png", "image/png");

        match client.upload(&image).await {
            Err(TransportError::LocalFile { path, .. }) => assert!(path.ends_with("here.png")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
