//! Gemini API client for multi-turn chat with inline audio and images.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::chatbot::prompt::PromptPart;

pub const SYSTEM_INSTRUCTION: &str = "You are a Telegram Chatbot. Maintain a friendly tone. \
Keep responses one paragraph short unless told otherwise. \
You have the ability to respond to audio and pictures.";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("empty response")]
    Empty,
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One side of an exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<PromptPart>,
}

impl Turn {
    pub fn user(parts: Vec<PromptPart>) -> Self {
        Self { role: Role::User, parts }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![PromptPart::Text(text.into())],
        }
    }
}

/// A chat model that answers the last user turn given the whole conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, turns: &[Turn]) -> Result<String, ModelError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

impl<'a> From<&'a PromptPart> for Part<'a> {
    fn from(part: &'a PromptPart) -> Self {
        match part {
            PromptPart::Text(text) => Part::Text { text },
            PromptPart::InlineMedia { mime_type, data } => Part::Inline {
                inline_data: InlineData { mime_type, data },
            },
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

pub struct GeminiClient {
    api_key: String,
    /// `<base>/models/<model>:generateContent`
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, api_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            api_key,
            endpoint: format!("{}/models/{}:generateContent", api_url.trim_end_matches('/'), model),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn request(&self, turns: &[Turn]) -> Result<String, ModelError> {
        let request = GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part::Text { text: SYSTEM_INSTRUCTION }],
            },
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: turn.role.as_str(),
                    parts: turn.parts.iter().map(Part::from).collect(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ModelError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(ModelError::Http)?;

        debug!("Gemini response status: {status}");

        let parsed: Option<GenerateResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = parsed.ok_or_else(|| ModelError::Parse(body.chars().take(200).collect()))?;

        if let Some(error) = parsed.error {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: error.message,
            });
        }

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ModelError::Blocked(reason));
        }

        let text: String = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }

        info!("🤖 Gemini replied ({} chars)", text.chars().count());
        Ok(text)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, turns: &[Turn]) -> Result<String, ModelError> {
        tokio::time::timeout(self.timeout, self.request(turns))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))?
    }
}
