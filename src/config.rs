use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or both credentials are absent.
    #[error("missing required credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
    /// A variable is present but unusable.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_WEBHOOK_PATH: &str = "/api/webhook";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// The two secrets the bot cannot run without.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub telegram_bot_token: String,
    pub gemini_api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Kept optional so the server can still start and answer health checks.
    pub telegram_bot_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub port: u16,
    pub webhook_path: String,
    pub gemini_model: String,
    pub gemini_api_url: String,
    /// Bot API server; also the base of file download URLs.
    pub telegram_api_url: String,
    /// Exchanges kept per chat before the oldest is dropped.
    pub history_limit: usize,
    pub session_ttl: Duration,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    /// Directory for the log file. Stdout only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// Missing credentials are not an error here, see [`Config::credentials`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = get(TELEGRAM_BOT_TOKEN);
        if let Some(ref token) = telegram_bot_token {
            validate_token(token)?;
        }

        let webhook_path = get("WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
        if !webhook_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                var: "WEBHOOK_PATH",
                reason: format!("'{webhook_path}' must start with '/'"),
            });
        }

        let history_limit = parse_or("HISTORY_LIMIT", get("HISTORY_LIMIT"), DEFAULT_HISTORY_LIMIT)?;
        if history_limit == 0 {
            return Err(ConfigError::Invalid {
                var: "HISTORY_LIMIT",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            telegram_bot_token,
            gemini_api_key: get(GEMINI_API_KEY),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            webhook_path,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_api_url: trim_url(get("GEMINI_API_URL").unwrap_or_else(|| DEFAULT_GEMINI_API_URL.to_string())),
            telegram_api_url: trim_url(
                get("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            ),
            history_limit,
            session_ttl: Duration::from_secs(parse_or(
                "SESSION_TTL_SECS",
                get("SESSION_TTL_SECS"),
                DEFAULT_SESSION_TTL_SECS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            max_body_bytes: parse_or("MAX_BODY_BYTES", get("MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES)?,
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    /// Both secrets, or the names of the ones that are missing.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        match (&self.telegram_bot_token, &self.gemini_api_key) {
            (Some(token), Some(key)) => Ok(Credentials {
                telegram_bot_token: token.clone(),
                gemini_api_key: key.clone(),
            }),
            (token, key) => {
                let mut missing = Vec::new();
                if token.is_none() {
                    missing.push(TELEGRAM_BOT_TOKEN);
                }
                if key.is_none() {
                    missing.push(GEMINI_API_KEY);
                }
                Err(ConfigError::MissingCredentials(missing))
            }
        }
    }
}

// Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
fn validate_token(token: &str) -> Result<(), ConfigError> {
    let valid = match token.split_once(':') {
        Some((id, secret)) => id.parse::<u64>().is_ok() && !secret.is_empty() && !secret.contains(':'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            var: TELEGRAM_BOT_TOKEN,
            reason: "appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
        })
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("'{raw}': {e}"),
        }),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
