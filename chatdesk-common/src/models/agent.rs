use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentAvailability {
    Online,
    Away,
    Offline,
}

impl fmt::Display for AgentAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentAvailability::Online => write!(f, "online"),
            AgentAvailability::Away => write!(f, "away"),
            AgentAvailability::Offline => write!(f, "offline"),
        }
    }
}

impl FromStr for AgentAvailability {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(AgentAvailability::Online),
            "away" => Ok(AgentAvailability::Away),
            "offline" => Ok(AgentAvailability::Offline),
            _ => Err(format!("Unknown availability: {}", s)),
        }
    }
}

/// A staff member who can take support chats.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Agent {
    pub agent_id: String,
    pub display_name: String,
    pub availability: AgentAvailability,
    /// Number of chats currently assigned to this agent. Only the workload
    /// store writes this.
    pub active_chat_count: i32,
    pub max_concurrent_chats: i32,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(agent_id: &str, display_name: &str, max_concurrent_chats: i32) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            display_name: display_name.to_string(),
            availability: AgentAvailability::Offline,
            active_chat_count: 0,
            max_concurrent_chats,
            updated_at: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.availability == AgentAvailability::Online
    }

    pub fn has_capacity(&self) -> bool {
        self.active_chat_count < self.max_concurrent_chats
    }

    /// Online with a free slot.
    pub fn is_eligible(&self) -> bool {
        self.is_online() && self.has_capacity()
    }

    pub fn free_slots(&self) -> i32 {
        (self.max_concurrent_chats - self.active_chat_count).max(0)
    }
}
