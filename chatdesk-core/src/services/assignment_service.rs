// File: src/services/assignment_service.rs

use std::cmp::Reverse;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::Error;
use crate::models::{Agent, AssignmentResult, ChatAssignment, ChatStatus, TieBreak};
use crate::services::agent_registry::AgentRegistry;
use crate::services::chat_queue::ChatQueue;

/// Claims lost to a concurrent writer before a chat is left for the next pass.
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Least-loaded eligible agent in `agents`, or `None` if nobody can take a chat.
pub fn select_agent_index(agents: &[Agent], tie_break: TieBreak) -> Option<usize> {
    let eligible = agents.iter().enumerate().filter(|(_, a)| a.is_eligible());
    match tie_break {
        TieBreak::AgentId => eligible
            .min_by_key(|(_, a)| (a.active_chat_count, a.agent_id.as_str()))
            .map(|(i, _)| i),
        TieBreak::MostHeadroom => eligible
            .min_by_key(|(_, a)| (a.active_chat_count, Reverse(a.free_slots()), a.agent_id.as_str()))
            .map(|(i, _)| i),
    }
}

pub struct AssignmentEngine {
    queue: Arc<ChatQueue>,
    registry: Arc<AgentRegistry>,
    tie_break: TieBreak,
    lock: Mutex<()>,
}

impl AssignmentEngine {
    pub fn new(queue: Arc<ChatQueue>, registry: Arc<AgentRegistry>, tie_break: TieBreak) -> Self {
        Self {
            queue,
            registry,
            tie_break,
            lock: Mutex::new(()),
        }
    }

    pub async fn assign_unassigned(&self) -> Result<AssignmentResult, Error> {
        self.assign_unassigned_at(Utc::now()).await
    }

    /// One pass over the queue, oldest chat first. Chats with no eligible agent
    /// stay queued. Assignments committed before an error stay committed.
    #[instrument(skip(self))]
    pub async fn assign_unassigned_at(&self, now: DateTime<Utc>) -> Result<AssignmentResult, Error> {
        let _guard = self.lock.lock().await;

        let pending = self.queue.pending().await?;
        let mut result = AssignmentResult::default();
        if pending.is_empty() {
            return Ok(result);
        }

        let mut agents = self.registry.eligible_agents().await?;

        for chat in pending {
            let mut attempts = 0;
            loop {
                let Some(idx) = select_agent_index(&agents, self.tie_break) else {
                    result.still_unassigned += 1;
                    break;
                };

                let agent = &agents[idx];
                match self.registry.claim(chat.chat_id, &agent.agent_id, agent.active_chat_count, now).await {
                    Ok(()) => {
                        result.assignments.push(ChatAssignment {
                            chat_id: chat.chat_id,
                            agent_id: agent.agent_id.clone(),
                            assigned_at: now,
                        });
                        agents[idx].active_chat_count += 1;
                        break;
                    }
                    Err(e) if e.is_concurrent_modification() => {
                        debug!(chat_id = %chat.chat_id, "claim lost: {}", e);
                        attempts += 1;

                        let current = self.queue.get(chat.chat_id).await?;
                        if current.status != ChatStatus::Unassigned {
                            // Someone else placed or ended it.
                            break;
                        }
                        if attempts >= MAX_CLAIM_ATTEMPTS {
                            result.still_unassigned += 1;
                            break;
                        }
                        agents = self.registry.eligible_agents().await?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            assigned = result.assigned_count(),
            still_unassigned = result.still_unassigned,
            "assignment pass finished"
        );
        Ok(result)
    }

    /// Operator override: put one specific queued chat on a chosen agent.
    /// The agent must be online and below capacity.
    pub async fn assign_chat_to(
        &self,
        chat_id: Uuid,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatAssignment, Error> {
        let _guard = self.lock.lock().await;

        let chat = self.queue.get(chat_id).await?;
        if chat.status != ChatStatus::Unassigned {
            return Err(Error::InvalidState(format!("chat {} is {}, not unassigned", chat_id, chat.status)));
        }

        let agent = self.registry.get_agent(agent_id).await?;
        if !agent.is_online() {
            return Err(Error::InvalidState(format!("agent {} is {}", agent_id, agent.availability)));
        }
        if !agent.has_capacity() {
            return Err(Error::InvalidState(format!(
                "agent {} is at capacity ({}/{})",
                agent_id, agent.active_chat_count, agent.max_concurrent_chats
            )));
        }

        self.registry.claim(chat_id, agent_id, agent.active_chat_count, now).await?;
        info!(%chat_id, agent_id, "chat assigned manually");

        Ok(ChatAssignment {
            chat_id,
            agent_id: agent_id.to_string(),
            assigned_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentAvailability;

    fn agent(id: &str, count: i32, max: i32) -> Agent {
        let mut a = Agent::new(id, id, max);
        a.availability = AgentAvailability::Online;
        a.active_chat_count = count;
        a
    }

    #[test]
    fn test_least_loaded_wins() {
        let agents = vec![agent("b", 3, 5), agent("a", 1, 5), agent("c", 2, 5)];
        assert_eq!(select_agent_index(&agents, TieBreak::AgentId), Some(1));
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let agents = vec![agent("carol", 1, 5), agent("alice", 1, 5), agent("bob", 1, 5)];
        assert_eq!(select_agent_index(&agents, TieBreak::AgentId), Some(1));
    }

    #[test]
    fn test_headroom_tie_break() {
        let agents = vec![agent("a", 1, 3), agent("b", 1, 8)];
        assert_eq!(select_agent_index(&agents, TieBreak::AgentId), Some(0));
        assert_eq!(select_agent_index(&agents, TieBreak::MostHeadroom), Some(1));
    }

    #[test]
    fn test_full_and_offline_agents_are_skipped() {
        let mut away = agent("a", 0, 5);
        away.availability = AgentAvailability::Away;
        let agents = vec![away, agent("b", 4, 4), agent("c", 3, 5)];
        assert_eq!(select_agent_index(&agents, TieBreak::AgentId), Some(2));

        let none = vec![agent("x", 2, 2)];
        assert_eq!(select_agent_index(&none, TieBreak::AgentId), None);
    }
}
