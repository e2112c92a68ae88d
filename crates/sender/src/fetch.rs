//! Media fetching: local uploads directory or HTTPS.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::error::SendError;

/// Fetches media bytes for the sender. URLs under `/uploads/` resolve from
/// the local uploads directory; everything else goes over HTTP(S) with a
/// 60-second timeout.
pub struct MediaFetcher {
    http: Client,
    uploads_dir: PathBuf,
}

impl MediaFetcher {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Result<Self, SendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            uploads_dir: uploads_dir.into(),
        })
    }

    /// Fetch the media bytes and their content type.
    pub async fn fetch(&self, url: &str) -> Result<(Vec<u8>, String), SendError> {
        if let Some(rel) = local_upload_rel(url) {
            return self.fetch_local(url, rel).await;
        }
        self.fetch_remote(url).await
    }

    async fn fetch_local(&self, url: &str, rel: &str) -> Result<(Vec<u8>, String), SendError> {
        let rel_path = Path::new(rel);
        // Must stay under the uploads directory.
        let escapes = rel.is_empty()
            || rel_path.is_absolute()
            || rel_path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        if escapes {
            return Err(SendError::InvalidUploadPath(url.to_string()));
        }

        let body = tokio::fs::read(self.uploads_dir.join(rel_path)).await?;
        let ct = content_type_for(rel).to_string();
        Ok((body, ct))
    }

    async fn fetch_remote(&self, url: &str) -> Result<(Vec<u8>, String), SendError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::HttpStatus {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let header_ct = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?.to_vec();

        let ct = if header_ct.is_empty() {
            content_type_for(strip_query(url)).to_string()
        } else {
            header_ct
        };
        Ok((body, ct))
    }
}

/// The path under the uploads directory, when the URL refers to a local
/// upload (`/uploads/...` or `uploads/...`).
fn local_upload_rel(url: &str) -> Option<&str> {
    let trimmed = url.strip_prefix('/').unwrap_or(url);
    trimmed.strip_prefix("uploads/")
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map(|(path, _)| path).unwrap_or(url)
}

/// Content type from the file suffix; octet-stream when unknown.
pub fn content_type_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".mp4") {
        "video/mp4"
    } else if lower.ends_with(".mp3") {
        "audio/mpeg"
    } else if lower.ends_with(".ogg") {
        "audio/ogg"
    } else if lower.ends_with(".wav") {
        "audio/wav"
    } else if lower.ends_with(".m4a") {
        "audio/m4a"
    } else {
        "application/octet-stream"
    }
}

/// File name for document parts, taken from the last URL path segment.
pub fn file_name_from_url(url: &str) -> String {
    let path = strip_query(url);
    match path.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name.to_string(),
        _ => "file".to_string(),
    }
}
