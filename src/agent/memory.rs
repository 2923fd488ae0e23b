//! Per-session conversation history

use crate::llm::provider::Message;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_MAX_SESSIONS: usize = 256;

#[derive(Default)]
struct Session {
    messages: VecDeque<Message>,
    last_active: u64,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    clock: u64,
}

/// Bounded message buffers keyed by session id
///
/// The number of sessions is capped as well; recording into a new session
/// when full evicts the least recently active one.
pub struct ConversationMemory {
    limit: usize,
    max_sessions: usize,
    sessions: Mutex<Sessions>,
}

impl ConversationMemory {
    /// Keep at most `limit` messages per session; 0 disables memory
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    pub async fn history(&self, session: &str) -> Vec<Message> {
        self.sessions
            .lock()
            .await
            .by_id
            .get(session)
            .map(|s| s.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record one completed exchange, dropping the oldest messages
    pub async fn record(&self, session: &str, user: Message, assistant: Message) {
        if self.limit == 0 {
            return;
        }

        let mut sessions = self.sessions.lock().await;
        if !sessions.by_id.contains_key(session) && sessions.by_id.len() >= self.max_sessions {
            let oldest = sessions
                .by_id
                .iter()
                .min_by_key(|(_, s)| s.last_active)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!(session = %oldest, "Evicting idle conversation");
                sessions.by_id.remove(&oldest);
            }
        }

        sessions.clock += 1;
        let now = sessions.clock;
        let entry = sessions.by_id.entry(session.to_string()).or_default();
        entry.last_active = now;
        entry.messages.push_back(user);
        entry.messages.push_back(assistant);
        while entry.messages.len() > self.limit {
            entry.messages.pop_front();
        }
    }

    pub async fn clear(&self, session: &str) {
        self.sessions.lock().await.by_id.remove(session);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.by_id.len()
    }
}
