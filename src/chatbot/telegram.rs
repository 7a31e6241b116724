//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, ParseMode};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("invalid Bot API url '{0}'")]
    InvalidUrl(String),
    #[error("failed to send message: {0}")]
    Send(#[source] RequestError),
    #[error("failed to get file info: {0}")]
    GetFile(#[source] RequestError),
}

/// The Bot API calls the dispatcher needs.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to a chat, rendered as Markdown.
    async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Remote path of a file, `None` when Telegram returns none.
    async fn file_path(&self, file_id: &str) -> Result<Option<String>, TelegramError>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Client talking to the Bot API server at `api_url`.
    ///
    /// A path prefix such as `http://host/tg` is kept for method calls.
    pub fn with_api_url(token: &str, api_url: &str) -> Result<Self, TelegramError> {
        // Url::join replaces the last segment unless the base ends with '/'
        let base = format!("{}/", api_url.trim_end_matches('/'));
        let url = reqwest::Url::parse(&base).map_err(|_| TelegramError::InvalidUrl(api_url.to_string()))?;
        Ok(Self::new(Bot::new(token).set_api_url(url)))
    }

    async fn send_chunk(&self, chat_id: ChatId, text: &str) -> Result<(), RequestError> {
        #[allow(deprecated)]
        let markdown = self.bot.send_message(chat_id, text).parse_mode(ParseMode::Markdown).await;

        match markdown {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::CantParseEntities(reason))) => {
                // Model output is not always valid Markdown; deliver it as plain text
                warn!(%reason, "Markdown rejected, resending as plain text");
                self.bot.send_message(chat_id, text).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let chat = ChatId(chat_id);
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_chunk(chat, &chunk).await.map_err(|e| {
                warn!(chat_id, "Failed to send: {e}");
                TelegramError::Send(e)
            })?;
        }
        info!(chat_id, chars = text.chars().count(), "📤 Reply sent");
        Ok(())
    }

    async fn file_path(&self, file_id: &str) -> Result<Option<String>, TelegramError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(TelegramError::GetFile)?;

        debug!(file_id, path = %file.path, "Resolved file path");
        Ok(Some(file.path).filter(|p| !p.is_empty()))
    }
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Prefers to break after a newline when one falls in the second half of a
/// piece. Empty input yields one empty piece so a reply is still sent.
/// A `max_chars` of zero is treated as one.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());
        if end < chars.len() {
            let window = &chars[start..end];
            if let Some(nl) = window.iter().rposition(|&c| c == '\n')
                && nl >= max_chars / 2
            {
                end = start + nl + 1;
            }
        }
        pieces.push(chars[start..end].iter().collect());
        start = end;
    }
    pieces
}
