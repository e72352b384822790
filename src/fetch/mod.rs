//! Source image download.
//!
//! The orchestrator only sees the [`Downloader`] trait: given a source URL
//! and a deadline it either yields the raw bytes with their detected type
//! and the origin's cache headers, or a typed error. The default
//! implementation runs over reqwest; tests plug in their own.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ProxyError;
use crate::imagetype::ImageType;

/// Raw image bytes plus their detected type.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub format: ImageType,
}

impl ImageData {
    pub fn new(data: Vec<u8>) -> Self {
        let format = ImageType::detect(&data);
        Self { data, format }
    }
}

/// A downloaded source image with the origin's cache headers.
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub image: ImageData,
    pub cache_control: Option<String>,
    pub expires: Option<String>,
}

/// Contract between the orchestrator and the source fetcher.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, deadline: Instant) -> Result<DownloadedImage, ProxyError>;
}

/// HTTP(S) downloader.
pub struct HttpDownloader {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpDownloader {
    pub fn new(max_bytes: usize) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("suzaku/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ProxyError::fetch_unexpected(format!("cannot build client: {}", e)))?;
        Ok(Self { client, max_bytes })
    }

    fn remaining(deadline: Instant) -> Result<Duration, ProxyError> {
        deadline
            .checked_duration_since(Instant::now())
            .ok_or(ProxyError::Timeout)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, deadline: Instant) -> Result<DownloadedImage, ProxyError> {
        let budget = Self::remaining(deadline)?;

        let response = self
            .client
            .get(url)
            .timeout(budget)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout
                } else {
                    ProxyError::fetch_unexpected(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::fetch(
                format!("origin returned {}", status),
                Some(status.as_u16()),
            ));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(ProxyError::fetch(
                    format!("source exceeds {} bytes", self.max_bytes),
                    None,
                ));
            }
        }

        let cache_control = header_string(&response, "Cache-Control");
        let expires = header_string(&response, "Expires");

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::Timeout
            } else {
                ProxyError::fetch_unexpected(format!("body read failed: {}", e))
            }
        })?;
        if body.len() > self.max_bytes {
            return Err(ProxyError::fetch(
                format!("source exceeds {} bytes", self.max_bytes),
                None,
            ));
        }

        let image = ImageData::new(body.to_vec());
        if image.format == ImageType::Unknown {
            return Err(ProxyError::fetch("source is not a supported image", None));
        }

        Ok(DownloadedImage {
            image,
            cache_control,
            expires,
        })
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
