//! Classification of raw Telegram updates into the kinds the bot answers.

use std::sync::LazyLock;

use regex::Regex;
use teloxide::types::{Message, Update, UpdateKind};

/// `/name`, `/name@botname`, then optional arguments.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+([\s\S]*))?$").expect("command regex is valid")
});

/// A Telegram file, identified by id. `path` is set when the remote path is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub id: String,
    pub path: Option<String>,
}

impl FileRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), path: None }
    }
}

/// Who sent the update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Sender {
    /// First name plus last name when present.
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref().filter(|l| !l.is_empty()) {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// What the update carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Command { name: String, args: String },
    Text(String),
    Voice(FileRef),
    Photo { file: FileRef, caption: Option<String> },
}

/// One update the bot will reply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub chat_id: i64,
    pub sender: Option<Sender>,
    pub kind: InboundKind,
}

impl InboundUpdate {
    /// Short label for logs.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            InboundKind::Command { .. } => "command",
            InboundKind::Text(_) => "text",
            InboundKind::Voice(_) => "voice",
            InboundKind::Photo { .. } => "photo",
        }
    }
}

/// Classify a raw update. `None` means the bot does not handle this kind.
pub fn classify(update: &Update) -> Option<InboundUpdate> {
    match &update.kind {
        UpdateKind::Message(msg) => classify_message(msg),
        _ => None,
    }
}

fn classify_message(msg: &Message) -> Option<InboundUpdate> {
    let kind = if let Some(text) = msg.text() {
        match parse_command(text) {
            Some((name, args)) => InboundKind::Command { name, args },
            None => InboundKind::Text(text.to_string()),
        }
    } else if let Some(voice) = msg.voice() {
        InboundKind::Voice(FileRef::new(voice.file.id.0.clone()))
    } else if let Some(sizes) = msg.photo() {
        // Sizes are ordered smallest first
        let largest = sizes.last()?;
        InboundKind::Photo {
            file: FileRef::new(largest.file.id.0.clone()),
            caption: msg.caption().map(str::to_string),
        }
    } else {
        return None;
    };

    let sender = msg.from.as_ref().map(|u| Sender {
        first_name: u.first_name.clone(),
        last_name: u.last_name.clone(),
    });

    Some(InboundUpdate {
        chat_id: msg.chat.id.0,
        sender,
        kind,
    })
}

/// Split `/name@bot args` into a lowercase name and trimmed arguments.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let caps = COMMAND_RE.captures(text.trim())?;
    let name = caps.get(1)?.as_str().to_lowercase();
    let args = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
    Some((name, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_update(json: &str) -> Update {
        serde_json::from_str(json).expect("valid update json")
    }

    const TEXT_UPDATE: &str = r#"{
        "update_id": 892252934,
        "message": {
            "message_id": 6557,
            "from": {"id": 218485655, "is_bot": false, "first_name": "Ana", "language_code": "en"},
            "chat": {"id": 218485655, "first_name": "Ana", "type": "private"},
            "date": 1681327209,
            "text": "hello"
        }
    }"#;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some(("start".into(), String::new())));
        assert_eq!(parse_command("/start@my_bot"), Some(("start".into(), String::new())));
        assert_eq!(parse_command("/Help me please"), Some(("help".into(), "me please".into())));
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn test_full_name() {
        let ana = Sender { first_name: "Ana".into(), last_name: None };
        assert_eq!(ana.full_name(), "Ana");
        let bob = Sender { first_name: "Bob".into(), last_name: Some("Stone".into()) };
        assert_eq!(bob.full_name(), "Bob Stone");
        let empty_last = Sender { first_name: "Cy".into(), last_name: Some(String::new()) };
        assert_eq!(empty_last.full_name(), "Cy");
    }

    #[test]
    fn test_classify_text() {
        let inbound = classify(&parse_update(TEXT_UPDATE)).expect("text is handled");
        assert_eq!(inbound.chat_id, 218485655);
        assert_eq!(inbound.kind, InboundKind::Text("hello".into()));
        assert_eq!(inbound.sender.unwrap().first_name, "Ana");
    }

    #[test]
    fn test_classify_start_command() {
        let json = TEXT_UPDATE.replace(r#""text": "hello""#, r#""text": "/start""#);
        let inbound = classify(&parse_update(&json)).unwrap();
        assert_eq!(
            inbound.kind,
            InboundKind::Command { name: "start".into(), args: String::new() }
        );
        assert_eq!(inbound.kind_name(), "command");
    }

    #[test]
    fn test_classify_voice() {
        let json = TEXT_UPDATE.replace(
            r#""text": "hello""#,
            r#""voice": {"file_id": "voice-1", "file_unique_id": "u-voice-1", "duration": 2, "mime_type": "audio/ogg", "file_size": 4096}"#,
        );
        let inbound = classify(&parse_update(&json)).unwrap();
        assert_eq!(inbound.kind, InboundKind::Voice(FileRef::new("voice-1")));
    }

    #[test]
    fn test_classify_photo_picks_largest_size() {
        let json = TEXT_UPDATE.replace(
            r#""text": "hello""#,
            r#""photo": [
                {"file_id": "small", "file_unique_id": "u-small", "file_size": 1000, "width": 90, "height": 90},
                {"file_id": "large", "file_unique_id": "u-large", "file_size": 50000, "width": 800, "height": 800}
            ],
            "caption": "what is this?""#,
        );
        let inbound = classify(&parse_update(&json)).unwrap();
        assert_eq!(
            inbound.kind,
            InboundKind::Photo {
                file: FileRef::new("large"),
                caption: Some("what is this?".into()),
            }
        );
    }

    #[test]
    fn test_classify_ignores_other_messages() {
        let json = TEXT_UPDATE.replace(
            r#""text": "hello""#,
            r#""location": {"latitude": 52.52, "longitude": 13.40}"#,
        );
        assert!(classify(&parse_update(&json)).is_none());
    }

    #[test]
    fn test_classify_ignores_edited_messages() {
        let json = TEXT_UPDATE.replace(r#""message":"#, r#""edited_message":"#);
        let json = json.replace(r#""date": 1681327209,"#, r#""date": 1681327209, "edit_date": 1681327300,"#);
        assert!(classify(&parse_update(&json)).is_none());
    }
}
