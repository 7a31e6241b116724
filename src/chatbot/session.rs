//! Per-chat conversation history with bounded size and idle eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chatbot::gemini::{ChatModel, ModelError, Turn};
use crate::chatbot::prompt::PromptPart;

/// A user prompt and the model's answer to it.
#[derive(Debug, Clone)]
struct Exchange {
    prompt: Turn,
    reply: Turn,
}

/// Conversation context for one chat.
pub struct ConversationSession {
    history: VecDeque<Exchange>,
    max_exchanges: usize,
}

impl ConversationSession {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            history: VecDeque::new(),
            max_exchanges: max_exchanges.max(1),
        }
    }

    /// Number of exchanges kept.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Ask `model` with the stored history plus `parts` as the new user turn.
    ///
    /// History only grows when the model answers.
    pub async fn send(&mut self, model: &dyn ChatModel, parts: Vec<PromptPart>) -> Result<String, ModelError> {
        let prompt = Turn::user(parts);
        let mut turns: Vec<Turn> = Vec::with_capacity(self.history.len() * 2 + 1);
        for exchange in &self.history {
            turns.push(exchange.prompt.clone());
            turns.push(exchange.reply.clone());
        }
        turns.push(prompt.clone());

        let text = model.generate(&turns).await?;

        self.history.push_back(Exchange {
            prompt,
            reply: Turn::model(text.clone()),
        });
        while self.history.len() > self.max_exchanges {
            self.history.pop_front();
        }
        Ok(text)
    }
}

struct Entry {
    session: Arc<Mutex<ConversationSession>>,
    last_used: Instant,
}

/// Sessions keyed by chat id.
///
/// Each session has its own lock, so updates from one chat run one at a time
/// while other chats proceed.
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Entry>>,
    max_exchanges: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(max_exchanges: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_exchanges,
            ttl,
        }
    }

    /// Session for `chat_id`, created when absent or expired.
    pub async fn session(&self, chat_id: i64) -> Arc<Mutex<ConversationSession>> {
        self.session_at(chat_id, Instant::now()).await
    }

    async fn session_at(&self, chat_id: i64, now: Instant) -> Arc<Mutex<ConversationSession>> {
        let mut sessions = self.sessions.lock().await;
        evict_expired(&mut sessions, now, self.ttl);

        let entry = sessions.entry(chat_id).or_insert_with(|| {
            debug!(chat_id, "New conversation session");
            Entry {
                session: Arc::new(Mutex::new(ConversationSession::new(self.max_exchanges))),
                last_used: now,
            }
        });
        entry.last_used = now;
        Arc::clone(&entry.session)
    }

    /// Drop the session for `chat_id`. Returns whether one existed.
    pub async fn reset(&self, chat_id: i64) -> bool {
        self.sessions.lock().await.remove(&chat_id).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Remove sessions idle for longer than the TTL as of `now`.
    pub async fn evict_expired_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().await;
        evict_expired(&mut sessions, now, self.ttl)
    }
}

fn evict_expired(sessions: &mut HashMap<i64, Entry>, now: Instant, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| now.saturating_duration_since(entry.last_used) <= ttl);
    let evicted = before - sessions.len();
    if evicted > 0 {
        info!("🧹 Evicted {} idle session(s)", evicted);
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Echoes the last user text and records how many turns it saw.
    #[derive(Default)]
    struct EchoModel {
        seen: StdMutex<Vec<usize>>,
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn generate(&self, turns: &[Turn]) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(turns.len());
            match turns.last().and_then(|t| t.parts.last()) {
                Some(PromptPart::Text(t)) => Ok(format!("echo: {t}")),
                _ => Err(ModelError::Empty),
            }
        }
    }

    struct FailingModel;

    /// Blocks inside `generate` until released.
    #[derive(Default)]
    struct GatedModel {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ChatModel for GatedModel {
        async fn generate(&self, _turns: &[Turn]) -> Result<String, ModelError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("done".into())
        }
    }

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn generate(&self, _turns: &[Turn]) -> Result<String, ModelError> {
            Err(ModelError::Empty)
        }
    }

    #[tokio::test]
    async fn test_history_is_sent_with_each_prompt() {
        let model = EchoModel::default();
        let mut session = ConversationSession::new(10);

        assert_eq!(session.send(&model, vec![PromptPart::text("one")]).await.unwrap(), "echo: one");
        session.send(&model, vec![PromptPart::text("two")]).await.unwrap();

        assert_eq!(*model.seen.lock().unwrap(), vec![1, 3]);
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn test_oldest_exchange_evicted_first() {
        let model = EchoModel::default();
        let mut session = ConversationSession::new(2);
        for text in ["a", "b", "c"] {
            session.send(&model, vec![PromptPart::text(text)]).await.unwrap();
        }
        assert_eq!(session.len(), 2);
        assert_eq!(session.history[0].prompt.parts, vec![PromptPart::text("b")]);
        assert_eq!(session.history[1].reply, Turn::model("echo: c"));
    }

    #[tokio::test]
    async fn test_failed_call_leaves_history_unchanged() {
        let mut session = ConversationSession::new(5);
        session.send(&EchoModel::default(), vec![PromptPart::text("ok")]).await.unwrap();

        let err = session.send(&FailingModel, vec![PromptPart::text("boom")]).await;
        assert!(err.is_err());
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_per_chat() {
        let store = SessionStore::new(5, Duration::from_secs(60));
        let model = EchoModel::default();

        store.session(1).await.lock().await.send(&model, vec![PromptPart::text("x")]).await.unwrap();

        assert_eq!(store.session(1).await.lock().await.len(), 1);
        assert!(store.session(2).await.lock().await.is_empty());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let ttl = Duration::from_secs(60);
        let store = SessionStore::new(5, ttl);
        let start = Instant::now();

        store.session_at(1, start).await;
        store.session_at(2, start + Duration::from_secs(50)).await;

        let evicted = store.evict_expired_at(start + Duration::from_secs(61)).await;
        assert_eq!(evicted, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_starts_fresh() {
        let ttl = Duration::from_secs(10);
        let store = SessionStore::new(5, ttl);
        let start = Instant::now();

        let first = store.session_at(1, start).await;
        first.lock().await.send(&EchoModel::default(), vec![PromptPart::text("x")]).await.unwrap();

        let later = store.session_at(1, start + Duration::from_secs(11)).await;
        assert!(later.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset() {
        let store = SessionStore::new(5, Duration::from_secs(60));
        store.session(9).await;
        assert!(store.reset(9).await);
        assert!(!store.reset(9).await);
    }

    #[tokio::test]
    async fn test_same_chat_waits_while_other_chats_proceed() {
        let store = SessionStore::new(5, Duration::from_secs(60));
        let gated = Arc::new(GatedModel::default());

        let first = store.session(1).await;
        let pending = {
            let gated = Arc::clone(&gated);
            tokio::spawn(async move { first.lock().await.send(gated.as_ref(), vec![PromptPart::text("a")]).await })
        };
        gated.entered.notified().await;

        // Chat 1 is mid-call, so its session stays locked
        assert!(store.session(1).await.try_lock().is_err());

        let reply = store
            .session(2)
            .await
            .lock()
            .await
            .send(&EchoModel::default(), vec![PromptPart::text("b")])
            .await
            .unwrap();
        assert_eq!(reply, "echo: b");

        gated.release.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), "done");
        assert_eq!(store.session(1).await.try_lock().unwrap().len(), 1);
    }
}
