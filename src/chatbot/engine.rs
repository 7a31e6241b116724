//! Update dispatcher - routes Telegram updates through Gemini and replies.

use std::sync::Arc;

use teloxide::types::Update;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::chatbot::gemini::ChatModel;
use crate::chatbot::media::{FetchError, MediaBlob, MediaFetcher, MediaKind};
use crate::chatbot::prompt;
use crate::chatbot::session::SessionStore;
use crate::chatbot::telegram::{Messenger, TelegramError};
use crate::chatbot::update::{classify, InboundKind, InboundUpdate};

pub const GENERIC_ERROR_REPLY: &str = "Something went wrong. Try again!";
pub const DOWNLOAD_ERROR_REPLY: &str = "Sorry, I couldn't download that file. Please try again.";
pub const UNSUPPORTED_FORMAT_REPLY: &str =
    "Sorry, this image format isn't supported. Please send a JPEG or PNG photo.";
pub const RESET_REPLY: &str = "Conversation cleared. Let's start fresh!";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to deliver reply to chat {chat_id}: {source}")]
    Reply {
        chat_id: i64,
        #[source]
        source: TelegramError,
    },
}

/// What happened to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a kind the bot answers.
    Ignored,
    Replied,
}

/// Routes each update to its handler and sends exactly one reply.
pub struct UpdateDispatcher {
    messenger: Arc<dyn Messenger>,
    model: Arc<dyn ChatModel>,
    media: MediaFetcher,
    sessions: SessionStore,
}

impl UpdateDispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        model: Arc<dyn ChatModel>,
        media: MediaFetcher,
        sessions: SessionStore,
    ) -> Self {
        Self {
            messenger,
            model,
            media,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Classify and handle a raw update.
    pub async fn dispatch(self: &Arc<Self>, update: Update) -> Result<DispatchOutcome, DispatchError> {
        match classify(&update) {
            Some(inbound) => self.dispatch_inbound(inbound).await,
            None => {
                debug!(update_id = update.id.0, "Ignoring unhandled update kind");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    /// Handle a classified update.
    ///
    /// The handler runs as its own task; if it panics, one generic reply is
    /// still attempted.
    pub async fn dispatch_inbound(self: &Arc<Self>, inbound: InboundUpdate) -> Result<DispatchOutcome, DispatchError> {
        let chat_id = inbound.chat_id;
        info!("📨 {} from chat {}", inbound.kind_name(), chat_id);

        let this = Arc::clone(self);
        match tokio::spawn(async move { this.handle(inbound).await }).await {
            Ok(result) => result.map(|()| DispatchOutcome::Replied),
            Err(e) => {
                error!(chat_id, "Update handler failed unexpectedly: {e}");
                self.reply(chat_id, GENERIC_ERROR_REPLY).await?;
                Ok(DispatchOutcome::Replied)
            }
        }
    }

    async fn handle(&self, inbound: InboundUpdate) -> Result<(), DispatchError> {
        let chat_id = inbound.chat_id;
        let text = self.respond(inbound).await;
        self.reply(chat_id, &text).await
    }

    /// The reply text for an update: the model's answer or a user-facing error.
    async fn respond(&self, inbound: InboundUpdate) -> String {
        let chat_id = inbound.chat_id;

        if matches!(inbound.kind, InboundKind::Command { ref name, .. } if name == "reset") {
            self.sessions.reset(chat_id).await;
            info!(chat_id, "Conversation reset");
            return RESET_REPLY.to_string();
        }

        let media = match self.fetch_media(&inbound).await {
            Ok(media) => media,
            Err(e) => {
                warn!(chat_id, "Media fetch failed: {e}");
                return fetch_error_reply(&e).to_string();
            }
        };

        let parts = prompt::build(&inbound, media);
        let session = self.sessions.session(chat_id).await;
        let mut session = session.lock().await;
        match session.send(self.model.as_ref(), parts).await {
            Ok(text) => text,
            Err(e) => {
                warn!(chat_id, "Model call failed: {e}");
                GENERIC_ERROR_REPLY.to_string()
            }
        }
    }

    async fn fetch_media(&self, inbound: &InboundUpdate) -> Result<Option<MediaBlob>, FetchError> {
        let (file, kind) = match &inbound.kind {
            InboundKind::Voice(file) => (file, MediaKind::Voice),
            InboundKind::Photo { file, .. } => (file, MediaKind::Photo),
            _ => return Ok(None),
        };
        self.media.fetch(file, kind).await.map(Some)
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        self.messenger
            .send_markdown(chat_id, text)
            .await
            .map_err(|source| DispatchError::Reply { chat_id, source })
    }
}

fn fetch_error_reply(e: &FetchError) -> &'static str {
    match e {
        FetchError::UnsupportedFormat(_) => UNSUPPORTED_FORMAT_REPLY,
        FetchError::NoPath
        | FetchError::Lookup(_)
        | FetchError::Transport(_)
        | FetchError::Http(_)
        | FetchError::Timeout(_) => DOWNLOAD_ERROR_REPLY,
    }
}
