//! Chatbot module - relays Telegram messages to Gemini.

pub mod engine;
pub mod gemini;
pub mod media;
pub mod mime;
pub mod prompt;
pub mod session;
pub mod telegram;
pub mod update;


pub use engine::{DispatchError, DispatchOutcome, UpdateDispatcher};
pub use gemini::{ChatModel, GeminiClient};
pub use media::MediaFetcher;
pub use session::SessionStore;
pub use telegram::{Messenger, TelegramClient};
