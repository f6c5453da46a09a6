//! HTTP access to the remote map server.
//!
//! Everything that talks to the network goes through [`HttpClient`] so the
//! listing providers and the download pipeline can be driven by a mock in
//! tests.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Timeout for establishing a connection to the remote server
const CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Trait for the HTTP operations the updater needs.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return the body as text.
    ///
    /// A non-success status is returned as [`HttpError::Status`] carrying
    /// the body, so callers can log what the server said.
    async fn get_text(&self, url: &str) -> Result<String, HttpError>;

    /// GET `url` and stream the body into `dest`, returning the byte count.
    async fn download(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, HttpError>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, HttpError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| HttpError::RequestFailed {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, HttpError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| request_failed(url, e))
    }
}

fn request_failed(url: &str, e: reqwest::Error) -> HttpError {
    HttpError::RequestFailed {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let response = self.send(url).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| request_failed(url, e))?;

        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(body)
    }

    async fn download(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, HttpError> {
        let mut response = self.send(url).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| request_failed(url, e))? {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        Ok(written)
    }
}
