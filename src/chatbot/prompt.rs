//! Turns a classified update into the parts sent to the model.

use crate::chatbot::media::MediaBlob;
use crate::chatbot::update::{InboundKind, InboundUpdate, Sender};

pub const VOICE_INSTRUCTION: &str = "Please respond to the audio prompt.";
pub const PHOTO_INSTRUCTION: &str = "Describe what you see in the photo";

/// One piece of a multi-part prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    InlineMedia { mime_type: String, data: String },
    Text(String),
}

impl PromptPart {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn media(blob: MediaBlob) -> Self {
        Self::InlineMedia {
            mime_type: blob.mime_type,
            data: blob.data,
        }
    }
}

/// Greeting instruction for `/start`.
pub fn welcome_prompt(sender: Option<&Sender>) -> String {
    let name = sender.map(Sender::full_name).unwrap_or_else(|| "there".to_string());
    format!("Welcome user with the fullname {name} in one sentence.")
}

/// Build the prompt for `update`.
///
/// `media` is the downloaded file for voice and photo updates; without it
/// only the text instruction is produced.
pub fn build(update: &InboundUpdate, media: Option<MediaBlob>) -> Vec<PromptPart> {
    let mut parts = Vec::with_capacity(2);
    match &update.kind {
        InboundKind::Command { name, .. } if name == "start" => {
            parts.push(PromptPart::text(welcome_prompt(update.sender.as_ref())));
        }
        InboundKind::Command { name, args } => {
            // Unknown commands reach the model as the text the user typed
            let text = if args.is_empty() {
                format!("/{name}")
            } else {
                format!("/{name} {args}")
            };
            parts.push(PromptPart::text(text));
        }
        InboundKind::Text(body) => parts.push(PromptPart::text(body.clone())),
        InboundKind::Voice(_) => {
            parts.extend(media.map(PromptPart::media));
            parts.push(PromptPart::text(VOICE_INSTRUCTION));
        }
        InboundKind::Photo { caption, .. } => {
            parts.extend(media.map(PromptPart::media));
            let instruction = caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(PHOTO_INSTRUCTION);
            parts.push(PromptPart::text(instruction));
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::update::FileRef;

    fn update(kind: InboundKind, sender: Option<Sender>) -> InboundUpdate {
        InboundUpdate { chat_id: 7, sender, kind }
    }

    fn blob(mime: &str) -> MediaBlob {
        MediaBlob {
            mime_type: mime.to_string(),
            data: "AAEC".to_string(),
        }
    }

    #[test]
    fn test_text_is_forwarded_verbatim() {
        let parts = build(&update(InboundKind::Text("hello".into()), None), None);
        assert_eq!(parts, vec![PromptPart::Text("hello".into())]);
    }

    #[test]
    fn test_start_greets_by_first_name() {
        let ana = Sender { first_name: "Ana".into(), last_name: None };
        let kind = InboundKind::Command { name: "start".into(), args: String::new() };
        let parts = build(&update(kind, Some(ana)), None);

        assert_eq!(parts.len(), 1);
        let PromptPart::Text(ref text) = parts[0] else {
            panic!("expected text part, got {:?}", parts[0]);
        };
        assert_eq!(text, "Welcome user with the fullname Ana in one sentence.");
    }

    #[test]
    fn test_start_includes_last_name() {
        let sender = Sender { first_name: "Ana".into(), last_name: Some("Lima".into()) };
        assert_eq!(
            welcome_prompt(Some(&sender)),
            "Welcome user with the fullname Ana Lima in one sentence."
        );
        assert!(welcome_prompt(None).contains("there"));
    }

    #[test]
    fn test_other_commands_become_text() {
        let kind = InboundKind::Command { name: "help".into(), args: "me".into() };
        assert_eq!(build(&update(kind, None), None), vec![PromptPart::text("/help me")]);
        let kind = InboundKind::Command { name: "about".into(), args: String::new() };
        assert_eq!(build(&update(kind, None), None), vec![PromptPart::text("/about")]);
    }

    #[test]
    fn test_voice_media_then_instruction() {
        let parts = build(&update(InboundKind::Voice(FileRef::new("v")), None), Some(blob("audio/ogg")));
        assert_eq!(
            parts,
            vec![
                PromptPart::InlineMedia { mime_type: "audio/ogg".into(), data: "AAEC".into() },
                PromptPart::text(VOICE_INSTRUCTION),
            ]
        );
    }

    #[test]
    fn test_photo_uses_caption() {
        let kind = InboundKind::Photo { file: FileRef::new("p"), caption: Some("what breed?".into()) };
        let parts = build(&update(kind, None), Some(blob("image/png")));
        assert_eq!(parts[1], PromptPart::text("what breed?"));
        assert!(matches!(parts[0], PromptPart::InlineMedia { ref mime_type, .. } if mime_type == "image/png"));
    }

    #[test]
    fn test_photo_without_caption_asks_for_description() {
        for caption in [None, Some("  ".to_string())] {
            let kind = InboundKind::Photo { file: FileRef::new("p"), caption };
            let parts = build(&update(kind, None), Some(blob("image/jpeg")));
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[1], PromptPart::text(PHOTO_INSTRUCTION));
        }
    }
}
