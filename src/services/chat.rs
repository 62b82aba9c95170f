use std::sync::Arc;
use tracing::{error, info};

use crate::db::Storage;
use crate::llm::ProviderCascade;
use crate::models::{MessageRecord, Role, UserState, DEFAULT_MOOD};
use crate::services::memory_document::MemoryStore;
use crate::system_prompt::{build_prompt, current_time_of_day, PromptContext};

/// One chat turn: read state, ask the providers, write everything back.
#[derive(Clone)]
pub struct ChatService {
    storage: Storage,
    memory: Arc<MemoryStore>,
    cascade: Arc<ProviderCascade>,
    owner_id: i64,
}

impl ChatService {
    pub fn new(
        storage: Storage,
        memory: Arc<MemoryStore>,
        cascade: Arc<ProviderCascade>,
        owner_id: i64,
    ) -> Self {
        Self {
            storage,
            memory,
            cascade,
            owner_id,
        }
    }

    /// Always returns text: the provider reply, or the fallback when none answered.
    pub async fn respond(&self, message: &str, role: Role) -> String {
        let owner_id = self.owner_id;
        info!("Chat turn for user {} ({:?})", owner_id, role);

        let (user, history) = self
            .storage
            .run_blocking(move |s| (s.get_user(owner_id), s.get_messages(owner_id, None)))
            .await
            .unwrap_or_else(|e| {
                error!("Failed to load chat state: {}", e);
                (UserState::new(owner_id), Vec::new())
            });

        let document = self.memory.snapshot();
        let prompt = build_prompt(&PromptContext {
            document: &document,
            owner_id,
            user_memory: &user.memory,
            history: &history,
            message,
            role,
            time_of_day: current_time_of_day(),
        });

        let reply = self.cascade.generate(&prompt).await;

        let mut updated = user;
        updated.remember_exchange(message, &reply);
        updated.mood = DEFAULT_MOOD.to_string();
        let record = MessageRecord::new(owner_id, message, &reply);
        if let Err(e) = self
            .storage
            .run_blocking(move |s| {
                s.save_user(&updated);
                s.save_message(&record);
            })
            .await
        {
            error!("Failed to save chat turn: {}", e);
        }

        reply
    }

    /// The last `limit` messages, oldest first.
    pub async fn recent_history(&self, limit: usize) -> Vec<MessageRecord> {
        self.history(Some(limit)).await
    }

    pub async fn full_history(&self) -> Vec<MessageRecord> {
        self.history(None).await
    }

    async fn history(&self, limit: Option<usize>) -> Vec<MessageRecord> {
        let owner_id = self.owner_id;
        self.storage
            .run_blocking(move |s| s.get_messages(owner_id, limit))
            .await
            .unwrap_or_else(|e| {
                error!("Failed to load history: {}", e);
                Vec::new()
            })
    }
}
