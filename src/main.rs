use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use telegemini::chatbot::{GeminiClient, MediaFetcher, SessionStore, TelegramClient, UpdateDispatcher};
use telegemini::config::{Config, ConfigError};
use telegemini::webhook::{self, BotState, WebhookHandler};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let _guard = init_logging(&config);

    info!("🚀 Starting telegemini...");
    info!("Model: {}, webhook path: {}", config.gemini_model, config.webhook_path);

    let state = match build_dispatcher(&config) {
        Ok(dispatcher) => BotState::Ready(Arc::new(dispatcher)),
        Err(e) => {
            error!("{e}; updates will be rejected until the environment is fixed");
            BotState::Misconfigured(e.to_string())
        }
    };

    let handler = Arc::new(WebhookHandler::new(state, config.max_body_bytes));
    let app = webhook::router(handler, &config.webhook_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    info!("🌐 Listening on http://{addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }
    info!("👋 Shut down");
}

/// Stdout logging, plus a plain-text file under `LOG_DIR` when set.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let mut file_error = None;
    let file = config.log_dir.as_ref().and_then(|dir| {
        std::fs::create_dir_all(dir).ok();
        let opened = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("telegemini.log"));
        match opened {
            Ok(file) => Some(tracing_appender::non_blocking(file)),
            Err(e) => {
                file_error = Some(format!("{}: {e}", dir.display()));
                None
            }
        }
    });
    let (writer, guard) = file.unzip();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                )
        }))
        .init();

    if let Some(e) = file_error {
        warn!("Could not open log file, logging to stdout only: {e}");
    }
    guard
}

fn build_dispatcher(config: &Config) -> Result<UpdateDispatcher, ConfigError> {
    let credentials = config.credentials()?;

    let telegram = TelegramClient::with_api_url(&credentials.telegram_bot_token, &config.telegram_api_url)
        .map_err(|e| ConfigError::Invalid {
            var: "TELEGRAM_API_URL",
            reason: e.to_string(),
        })?;
    let messenger = Arc::new(telegram);

    let model = Arc::new(GeminiClient::new(
        credentials.gemini_api_key,
        &config.gemini_api_url,
        &config.gemini_model,
        config.request_timeout,
    ));
    let media = MediaFetcher::new(
        messenger.clone(),
        &config.telegram_api_url,
        &credentials.telegram_bot_token,
        config.request_timeout,
    );
    let sessions = SessionStore::new(config.history_limit, config.session_ttl);

    Ok(UpdateDispatcher::new(messenger, model, media, sessions))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
