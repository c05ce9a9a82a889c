use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ledgerbot_core::config::SessionConfig;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Self::User => "Usuario",
            Self::Assistant => "Asistente",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_messages: usize,
    pub context_messages: usize,
    pub ttl: Duration,
    pub max_conversations: usize,
}

impl SessionLimits {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            context_messages: config.context_messages,
            ttl: Duration::from_secs(config.ttl_secs),
            max_conversations: config.max_conversations,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_messages: 10,
            context_messages: 5,
            ttl: Duration::from_secs(7200),
            max_conversations: 1000,
        }
    }
}

#[derive(Debug)]
struct Conversation {
    messages: VecDeque<SessionMessage>,
    last_active: Instant,
}

impl Conversation {
    fn new() -> Self {
        Self { messages: VecDeque::new(), last_active: Instant::now() }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_active.elapsed() > ttl
    }
}

/// Rolling per-conversation history. The map lock is held only to find or
/// insert an entry; each conversation has its own lock.
pub struct SessionStore {
    limits: SessionLimits,
    conversations: RwLock<HashMap<String, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self { limits, conversations: RwLock::new(HashMap::new()) }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    async fn entry(&self, conversation_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations.read().await.get(conversation_id).cloned()
    }

    /// Recent history, emptied first if the conversation sat idle past the TTL.
    pub async fn history(&self, conversation_id: &str) -> Vec<SessionMessage> {
        let Some(entry) = self.entry(conversation_id).await else {
            return Vec::new();
        };
        let mut conversation = entry.lock().await;
        if conversation.is_expired(self.limits.ttl) {
            debug!(
                event_name = "session.expired",
                conversation_id,
                "clearing idle conversation"
            );
            conversation.messages.clear();
        }
        conversation.messages.iter().cloned().collect()
    }

    /// Classifier input for `message`, prefixed with recent history when
    /// there is any.
    pub async fn render_context(&self, conversation_id: &str, message: &str) -> Option<String> {
        let history = self.history(conversation_id).await;
        if history.is_empty() || self.limits.context_messages == 0 {
            return None;
        }

        let start = history.len().saturating_sub(self.limits.context_messages);
        let lines: Vec<String> = history[start..]
            .iter()
            .map(|message| format!("{}: {}", message.role.label(), message.content))
            .collect();
        Some(format!(
            "Contexto de conversación reciente:\n{}\n\nMensaje actual: {message}",
            lines.join("\n")
        ))
    }

    pub async fn record_exchange(&self, conversation_id: &str, user: &str, assistant: &str) {
        let entry = {
            let mut conversations = self.conversations.write().await;
            let entry = conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Conversation::new())))
                .clone();
            if conversations.len() > self.limits.max_conversations {
                evict_least_recent(&mut conversations, conversation_id);
            }
            entry
        };

        let mut conversation = entry.lock().await;
        if conversation.is_expired(self.limits.ttl) {
            conversation.messages.clear();
        }
        conversation
            .messages
            .push_back(SessionMessage { role: Role::User, content: user.to_string() });
        conversation
            .messages
            .push_back(SessionMessage { role: Role::Assistant, content: assistant.to_string() });
        while conversation.messages.len() > self.limits.max_messages {
            conversation.messages.pop_front();
        }
        conversation.last_active = Instant::now();
    }

    /// Drops every conversation idle past the TTL. Returns how many went.
    pub async fn purge_expired(&self) -> usize {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        let ttl = self.limits.ttl;
        conversations.retain(|_, entry| match entry.try_lock() {
            Ok(conversation) => !conversation.is_expired(ttl),
            Err(_) => true,
        });
        let purged = before - conversations.len();
        if purged > 0 {
            debug!(event_name = "session.purged", purged, "expired conversations removed");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}

/// Busy conversations are skipped; they are active by definition.
fn evict_least_recent(
    conversations: &mut HashMap<String, Arc<Mutex<Conversation>>>,
    keep: &str,
) {
    let oldest = conversations
        .iter()
        .filter(|(id, _)| id.as_str() != keep)
        .filter_map(|(id, entry)| entry.try_lock().ok().map(|c| (id.clone(), c.last_active)))
        .min_by_key(|(_, last_active)| *last_active)
        .map(|(id, _)| id);

    if let Some(id) = oldest {
        conversations.remove(&id);
        debug!(event_name = "session.evicted", conversation_id = %id, "least recent conversation evicted");
    }
}
