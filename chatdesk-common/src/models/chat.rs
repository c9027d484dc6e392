// File: chatdesk-common/src/models/chat.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Unassigned,
    Assigned,
    Resolved,
    Closed,
}

impl ChatStatus {
    /// Unassigned and assigned chats still need staff attention.
    pub fn is_open(&self) -> bool {
        matches!(self, ChatStatus::Unassigned | ChatStatus::Assigned)
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStatus::Unassigned => write!(f, "unassigned"),
            ChatStatus::Assigned => write!(f, "assigned"),
            ChatStatus::Resolved => write!(f, "resolved"),
            ChatStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for ChatStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unassigned" => Ok(ChatStatus::Unassigned),
            "assigned" => Ok(ChatStatus::Assigned),
            "resolved" => Ok(ChatStatus::Resolved),
            "closed" => Ok(ChatStatus::Closed),
            _ => Err(format!("Unknown chat status: {}", s)),
        }
    }
}

/// A single support conversation between a community member and staff.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatSession {
    pub chat_id: Uuid,
    /// Handle of the member who opened the chat.
    pub requester: String,
    /// Selects a per-category SLA policy; `None` uses the global one.
    pub category: Option<String>,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub assigned_agent_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    pub fn new(requester: &str, category: Option<&str>, created_at: DateTime<Utc>) -> Self {
        Self {
            chat_id: Uuid::new_v4(),
            requester: requester.to_string(),
            category: category.map(String::from),
            status: ChatStatus::Unassigned,
            created_at,
            last_message_at: created_at,
            assigned_agent_id: None,
            assigned_at: None,
            first_response_at: None,
            closed_at: None,
        }
    }

    /// Assigned to someone and nobody on staff has answered yet.
    pub fn is_movable(&self) -> bool {
        self.status == ChatStatus::Assigned && self.first_response_at.is_none()
    }

    /// Checks the status/agent pairing every stored chat must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        match self.status {
            ChatStatus::Assigned if self.assigned_agent_id.is_none() || self.assigned_at.is_none() => {
                Err(format!("chat {} is assigned without an agent or assigned_at", self.chat_id))
            }
            ChatStatus::Unassigned if self.assigned_agent_id.is_some() => {
                Err(format!("chat {} is unassigned but references an agent", self.chat_id))
            }
            _ => Ok(()),
        }
    }
}
