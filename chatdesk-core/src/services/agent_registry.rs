// File: src/services/agent_registry.rs

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::Error;
use crate::models::{Agent, AgentAvailability, ChatStatus};
use crate::repositories::{AgentRepository, ChatSessionRepository, WorkloadStore};

/// Staff directory plus the only code path that writes `active_chat_count`.
/// Every counter change goes through `WorkloadStore`, together with the chat
/// status change that justifies it.
pub struct AgentRegistry {
    agents: Arc<dyn AgentRepository>,
    chats: Arc<dyn ChatSessionRepository>,
    workload: Arc<dyn WorkloadStore>,
}

impl AgentRegistry {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        chats: Arc<dyn ChatSessionRepository>,
        workload: Arc<dyn WorkloadStore>,
    ) -> Self {
        Self { agents, chats, workload }
    }

    /// Adds or updates a directory entry. An existing agent keeps its workload.
    pub async fn register_agent(
        &self,
        agent_id: &str,
        display_name: &str,
        max_concurrent_chats: i32,
        availability: AgentAvailability,
    ) -> Result<Agent, Error> {
        if agent_id.trim().is_empty() {
            return Err(Error::Configuration("agent id must not be empty".into()));
        }
        if max_concurrent_chats <= 0 {
            return Err(Error::Configuration(format!(
                "agent {} needs a positive chat capacity, got {}",
                agent_id, max_concurrent_chats
            )));
        }

        let mut agent = Agent::new(agent_id, display_name, max_concurrent_chats);
        agent.availability = availability;
        self.agents.upsert_agent(&agent).await?;
        info!(agent_id, %availability, max_concurrent_chats, "agent registered");

        self.get_agent(agent_id).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent, Error> {
        self.agents
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("agent {}", agent_id)))
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, Error> {
        self.agents.list_agents().await
    }

    pub async fn online_agents(&self) -> Result<Vec<Agent>, Error> {
        let agents = self.agents.list_agents().await?;
        Ok(agents.into_iter().filter(Agent::is_online).collect())
    }

    /// Online agents below capacity, as of this read.
    pub async fn eligible_agents(&self) -> Result<Vec<Agent>, Error> {
        let agents = self.agents.list_agents().await?;
        Ok(agents.into_iter().filter(Agent::is_eligible).collect())
    }

    /// Updates availability. Going offline hands back every assigned chat that
    /// nobody has answered yet; the returned ids are back in the queue.
    pub async fn set_availability(
        &self,
        agent_id: &str,
        availability: AgentAvailability,
    ) -> Result<Vec<Uuid>, Error> {
        if !self.agents.set_availability(agent_id, availability).await? {
            return Err(Error::NotFound(format!("agent {}", agent_id)));
        }
        info!(agent_id, %availability, "agent availability changed");

        if availability != AgentAvailability::Offline {
            return Ok(Vec::new());
        }

        let mut requeued = Vec::new();
        for chat in self.chats.list_assigned_to(agent_id).await? {
            if !chat.is_movable() {
                continue;
            }
            match self.workload.requeue_chat(chat.chat_id, agent_id).await {
                Ok(()) => requeued.push(chat.chat_id),
                Err(e) if e.is_concurrent_modification() => {
                    debug!(chat_id = %chat.chat_id, agent_id, "requeue skipped: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        if !requeued.is_empty() {
            info!(agent_id, requeued = requeued.len(), "returned unanswered chats to the queue");
        }
        Ok(requeued)
    }

    /// A capacity below the current workload is allowed; the agent simply
    /// receives nothing until it drains.
    pub async fn set_capacity(&self, agent_id: &str, max_concurrent_chats: i32) -> Result<Agent, Error> {
        if max_concurrent_chats < 0 {
            return Err(Error::Configuration(format!(
                "capacity for agent {} cannot be negative",
                agent_id
            )));
        }
        if !self.agents.set_capacity(agent_id, max_concurrent_chats).await? {
            return Err(Error::NotFound(format!("agent {}", agent_id)));
        }
        self.get_agent(agent_id).await
    }

    pub async fn reconcile_workload(&self) -> Result<u64, Error> {
        let repaired = self.agents.reconcile_workload().await?;
        if repaired > 0 {
            info!(repaired, "repaired drifted agent workloads");
        }
        Ok(repaired)
    }

    pub async fn claim(
        &self,
        chat_id: Uuid,
        agent_id: &str,
        expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.workload.claim_chat(chat_id, agent_id, expected_count, at).await
    }

    pub async fn transfer(
        &self,
        chat_id: Uuid,
        from: &Agent,
        to: &Agent,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.workload
            .transfer_chat(
                chat_id,
                &from.agent_id,
                from.active_chat_count,
                &to.agent_id,
                to.active_chat_count,
                at,
            )
            .await
    }

    /// Ends an open chat and frees the agent slot it held, if any.
    pub async fn release(
        &self,
        chat_id: Uuid,
        outcome: ChatStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<String>, Error> {
        let released = self.workload.finish_chat(chat_id, outcome, at).await?;
        debug!(%chat_id, %outcome, released = ?released, "chat finished");
        Ok(released)
    }
}
