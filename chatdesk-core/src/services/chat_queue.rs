// File: src/services/chat_queue.rs

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::Error;
use crate::models::{ChatSession, ChatStatus};
use crate::repositories::ChatSessionRepository;
use crate::services::agent_registry::AgentRegistry;

/// Owns chat sessions from ingestion until they are resolved or closed.
pub struct ChatQueue {
    chats: Arc<dyn ChatSessionRepository>,
    registry: Arc<AgentRegistry>,
}

impl ChatQueue {
    pub fn new(chats: Arc<dyn ChatSessionRepository>, registry: Arc<AgentRegistry>) -> Self {
        Self { chats, registry }
    }

    /// Accepts a session from the ingestion side. It must arrive unassigned.
    pub async fn enqueue(&self, chat: ChatSession) -> Result<ChatSession, Error> {
        if chat.status != ChatStatus::Unassigned {
            return Err(Error::InvalidState(format!(
                "chat {} must be enqueued unassigned, not {}",
                chat.chat_id, chat.status
            )));
        }
        chat.check_invariants().map_err(Error::InvalidState)?;

        self.chats.insert_chat(&chat).await?;
        info!(chat_id = %chat.chat_id, category = ?chat.category, "chat enqueued");
        Ok(chat)
    }

    pub async fn open_chat(&self, requester: &str, category: Option<&str>) -> Result<ChatSession, Error> {
        self.enqueue(ChatSession::new(requester, category, Utc::now())).await
    }

    pub async fn get(&self, chat_id: Uuid) -> Result<ChatSession, Error> {
        self.chats
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))
    }

    /// Unassigned chats, oldest first.
    pub async fn pending(&self) -> Result<Vec<ChatSession>, Error> {
        self.chats.list_by_status(&[ChatStatus::Unassigned]).await
    }

    /// Every chat still open (unassigned or assigned), oldest first.
    pub async fn active(&self) -> Result<Vec<ChatSession>, Error> {
        self.chats
            .list_by_status(&[ChatStatus::Unassigned, ChatStatus::Assigned])
            .await
    }

    /// Most recently assigned first.
    pub async fn assigned_to(&self, agent_id: &str) -> Result<Vec<ChatSession>, Error> {
        self.chats.list_assigned_to(agent_id).await
    }

    /// Returns false when the first response was already on record.
    pub async fn record_first_response(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error> {
        let chat = self.get(chat_id).await?;
        if !chat.status.is_open() {
            return Err(Error::InvalidState(format!("chat {} is already {}", chat_id, chat.status)));
        }
        let recorded = self.chats.record_first_response(chat_id, at).await?;
        debug!(%chat_id, recorded, "first response");
        Ok(recorded)
    }

    pub async fn record_message(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<(), Error> {
        if !self.chats.touch_last_message(chat_id, at).await? {
            return Err(Error::NotFound(format!("chat {}", chat_id)));
        }
        Ok(())
    }

    pub async fn resolve(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<ChatSession, Error> {
        self.finish(chat_id, ChatStatus::Resolved, at).await
    }

    pub async fn close(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<ChatSession, Error> {
        self.finish(chat_id, ChatStatus::Closed, at).await
    }

    async fn finish(&self, chat_id: Uuid, outcome: ChatStatus, at: DateTime<Utc>) -> Result<ChatSession, Error> {
        let chat = self.get(chat_id).await?;
        if !chat.status.is_open() {
            return Err(Error::InvalidState(format!("chat {} is already {}", chat_id, chat.status)));
        }
        let released = self.registry.release(chat_id, outcome, at).await?;
        info!(%chat_id, %outcome, released_agent = ?released, "chat finished");
        self.get(chat_id).await
    }
}
