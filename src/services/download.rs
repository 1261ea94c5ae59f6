//! Image download over plain HTTP.
//!
//! The body is sniffed with [`image::guess_format`] before anything is
//! written: search results regularly point at HTML pages, placeholders or
//! truncated files, and those must count as a failed candidate rather than
//! land on disk as `0-original.png`. The detected format also picks the file
//! extension.
//!
//! Bodies larger than [`DEFAULT_MAX_IMAGE_BYTES`] (configurable with
//! [`HttpImageDownloader::with_max_bytes`]) are rejected, both from the
//! declared `Content-Length` and while streaming.
//!
//! Files are written to `<destination>.<ext>.part` first and renamed into
//! place, so an interrupted run never leaves a half-written image under the
//! final name.

use super::{check_status, http_client, ImageDownloader};
use crate::error::ServiceError;
use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Largest body accepted as an image: 20 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

pub struct HttpImageDownloader {
    client: reqwest::Client,
    timeout_secs: u64,
    max_bytes: u64,
}

impl HttpImageDownloader {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout)?,
            timeout_secs: timeout.as_secs(),
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    /// Reject bodies larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, size: u64) -> ServiceError {
        ServiceError::InvalidResponse(format!(
            "image body of {size}+ bytes exceeds the {} byte limit",
            self.max_bytes
        ))
    }

    /// Read the body chunk by chunk, stopping as soon as the limit is passed.
    async fn read_limited(&self, mut response: reqwest::Response) -> Result<Vec<u8>, ServiceError> {
        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(self.too_large(declared));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// File extension for a detected image format.
pub fn extension_for(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf, ServiceError> {
        debug!("Downloading image: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let bytes = self.read_limited(check_status(response)?).await?;

        let format = image::guess_format(&bytes).map_err(|_| {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            ServiceError::InvalidResponse(format!(
                "not a recognised image ({} bytes, first bytes {:?})",
                bytes.len(),
                magic
            ))
        })?;

        let path = destination.with_extension(extension_for(format));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ServiceError::Io {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }
        }

        let tmp_path = path.with_extension(format!("{}.part", extension_for(format)));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| ServiceError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ServiceError::Io {
                path: path.clone(),
                source: e,
            })?;

        info!("Downloaded {} → {}", url, path.display());
        Ok(path)
    }
}
