//! HTTP entry point: turns webhook requests into dispatched updates.
//!
//! - `GET` answers a static liveness text, whatever the configuration.
//! - `POST` parses a Telegram `Update` and waits for it to be handled.
//! - Anything else is `405`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;
use teloxide::types::Update;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::chatbot::UpdateDispatcher;

pub const ACTIVE_BODY: &str = "Bot is active";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read request body: {0}")]
    Read(String),
    #[error("request body is not a Telegram update: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of a complete request body.
///
/// Hosts that hand over an already-buffered body use [`Bytes`]; the axum
/// server streams the body in through [`Body`].
#[async_trait]
pub trait BodyReader: Send {
    async fn read_body(self, limit: usize) -> Result<Bytes, ParseError>;
}

#[async_trait]
impl BodyReader for Bytes {
    async fn read_body(self, limit: usize) -> Result<Bytes, ParseError> {
        if self.len() > limit {
            return Err(ParseError::Read(format!("body exceeds {limit} bytes")));
        }
        Ok(self)
    }
}

#[async_trait]
impl BodyReader for Body {
    async fn read_body(self, limit: usize) -> Result<Bytes, ParseError> {
        axum::body::to_bytes(self, limit)
            .await
            .map_err(|e| ParseError::Read(e.to_string()))
    }
}

/// Whether the bot can handle updates.
pub enum BotState {
    Ready(Arc<UpdateDispatcher>),
    /// Credentials were missing at startup; holds the reason for logs.
    Misconfigured(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(&'static str),
    Json(serde_json::Value),
}

/// Status and body of a webhook response.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl WebhookResponse {
    fn text(status: StatusCode, text: &'static str) -> Self {
        Self { status, body: ResponseBody::Text(text) }
    }

    fn error(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ResponseBody::Json(json!({ "error": message })),
        }
    }

    fn internal_error() -> Self {
        Self::error("Internal Server Error")
    }
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        match self.body {
            ResponseBody::Empty => self.status.into_response(),
            ResponseBody::Text(text) => {
                (self.status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
            }
            ResponseBody::Json(value) => (self.status, Json(value)).into_response(),
        }
    }
}

/// The webhook entry point, independent of how the body arrives.
pub struct WebhookHandler {
    state: BotState,
    max_body_bytes: usize,
}

impl WebhookHandler {
    pub fn new(state: BotState, max_body_bytes: usize) -> Self {
        Self { state, max_body_bytes }
    }

    pub async fn handle<B: BodyReader>(&self, method: &Method, body: B) -> WebhookResponse {
        match *method {
            Method::GET => WebhookResponse::text(StatusCode::OK, ACTIVE_BODY),
            Method::POST => self.handle_post(body).await,
            _ => WebhookResponse {
                status: StatusCode::METHOD_NOT_ALLOWED,
                body: ResponseBody::Empty,
            },
        }
    }

    async fn handle_post<B: BodyReader>(&self, body: B) -> WebhookResponse {
        let dispatcher = match &self.state {
            BotState::Ready(dispatcher) => dispatcher,
            BotState::Misconfigured(reason) => {
                error!("Rejecting update, bot is not configured: {reason}");
                return WebhookResponse::error("Configuration Error");
            }
        };

        let update = match parse_update(body, self.max_body_bytes).await {
            Ok(update) => update,
            Err(e) => {
                warn!("Bad webhook request: {e}");
                return WebhookResponse::internal_error();
            }
        };

        debug!(update_id = update.id.0, "Webhook update received");
        match dispatcher.dispatch(update).await {
            Ok(_) => WebhookResponse::text(StatusCode::OK, "OK"),
            Err(e) => {
                error!("Failed to handle update: {e}");
                WebhookResponse::internal_error()
            }
        }
    }
}

async fn parse_update<B: BodyReader>(body: B, limit: usize) -> Result<Update, ParseError> {
    let bytes = body.read_body(limit).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Routes for `/`, `webhook_path` and `/healthz`.
pub fn router(handler: Arc<WebhookHandler>, webhook_path: &str) -> Router {
    let mut router = Router::new()
        .route("/", any(entry))
        .route("/healthz", get(healthz));
    if webhook_path != "/" && webhook_path != "/healthz" {
        router = router.route(webhook_path, any(entry));
    }
    router.with_state(handler)
}

async fn entry(State(handler): State<Arc<WebhookHandler>>, method: Method, body: Body) -> WebhookResponse {
    handler.handle(&method, body).await
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
