//! Downloads voice and photo files from Telegram for inline use in prompts.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use thiserror::Error;
use tracing::{debug, info};

use crate::chatbot::mime;
use crate::chatbot::telegram::{Messenger, TelegramError};
use crate::chatbot::update::FileRef;

/// Telegram voice notes are OGG Opus.
pub const VOICE_MIME: &str = "audio/ogg";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Telegram returned no file path")]
    NoPath,
    #[error("file lookup failed: {0}")]
    Lookup(#[from] TelegramError),
    #[error("unsupported image format '{0}'")]
    UnsupportedFormat(String),
    #[error("download failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("download returned HTTP {0}")]
    Http(reqwest::StatusCode),
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
}

/// Which kind of file is being fetched; decides the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Voice,
    Photo,
}

/// Base64 payload tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: String,
}

/// Resolves and downloads Telegram files.
pub struct MediaFetcher {
    messenger: Arc<dyn Messenger>,
    http: reqwest::Client,
    /// `<api base>/file/bot<token>`
    file_base: String,
    timeout: Duration,
}

impl MediaFetcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        api_url: &str,
        token: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            messenger,
            http: reqwest::Client::new(),
            file_base: format!("{}/file/bot{}", api_url.trim_end_matches('/'), token),
            timeout,
        }
    }

    /// Download URL for a resolved file path.
    pub fn download_url(&self, path: &str) -> String {
        format!("{}/{}", self.file_base, path.trim_start_matches('/'))
    }

    /// Resolve, download and encode `file`.
    ///
    /// `getFile` is only called when `file.path` is not already known.
    pub async fn fetch(&self, file: &FileRef, kind: MediaKind) -> Result<MediaBlob, FetchError> {
        tokio::time::timeout(self.timeout, self.fetch_inner(file, kind))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    async fn fetch_inner(&self, file: &FileRef, kind: MediaKind) -> Result<MediaBlob, FetchError> {
        let path = match &file.path {
            Some(path) => path.clone(),
            None => self.messenger.file_path(&file.id).await?.ok_or(FetchError::NoPath)?,
        };

        // Decide the type before downloading anything we can't use
        let mime_type = match kind {
            MediaKind::Voice => VOICE_MIME,
            MediaKind::Photo => mime::resolve_path(&path).map_err(|e| FetchError::UnsupportedFormat(e.0))?,
        };

        let response = self
            .http
            .get(self.download_url(&path))
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status));
        }

        let bytes = response.bytes().await.map_err(FetchError::Transport)?;
        debug!(path = %path, bytes = bytes.len(), "Downloaded file");
        info!("📥 Downloaded {:?} ({} bytes, {})", kind, bytes.len(), mime_type);

        Ok(MediaBlob {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        })
    }
}
