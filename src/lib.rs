//! Telegram bot that relays text, voice and photo messages to Gemini.

pub mod chatbot;
pub mod config;
pub mod webhook;
