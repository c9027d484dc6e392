use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatAssignment {
    pub chat_id: Uuid,
    pub agent_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// Outcome of one pass over the queue.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub assignments: Vec<ChatAssignment>,
    /// Chats left in the queue because no eligible agent was available
    /// (or every attempt lost a race).
    pub still_unassigned: usize,
}

impl AssignmentResult {
    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatTransfer {
    pub chat_id: Uuid,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub transferred_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RebalanceResult {
    pub transfers: Vec<ChatTransfer>,
}

impl RebalanceResult {
    pub fn moved_count(&self) -> usize {
        self.transfers.len()
    }
}

/// Response of the operator-facing "assign now" action.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSummary {
    pub assigned_count: usize,
    pub rebalanced_count: usize,
}
