use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use crate::error::Error;
use crate::models::{Agent, AgentAvailability, BreachType, ChatSession, ChatStatus, SlaBreachEvent, SlaPolicy, SlaPolicySet};

#[async_trait]
pub trait ChatSessionRepository: Send + Sync {
    async fn insert_chat(&self, chat: &ChatSession) -> Result<(), Error>;
    async fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatSession>, Error>;

    /// Chats in any of `statuses`, oldest first (ties by chat id).
    async fn list_by_status(&self, statuses: &[ChatStatus]) -> Result<Vec<ChatSession>, Error>;

    async fn list_assigned_to(&self, agent_id: &str) -> Result<Vec<ChatSession>, Error>;

    /// Sets `first_response_at` only if it was still empty. Returns whether it did.
    async fn record_first_response(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error>;

    async fn touch_last_message(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Inserts or updates the directory fields. Never overwrites an existing
    /// agent's `active_chat_count`.
    async fn upsert_agent(&self, agent: &Agent) -> Result<(), Error>;
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, Error>;

    /// All agents ordered by agent id.
    async fn list_agents(&self) -> Result<Vec<Agent>, Error>;

    async fn set_availability(&self, agent_id: &str, availability: AgentAvailability) -> Result<bool, Error>;
    async fn set_capacity(&self, agent_id: &str, max_concurrent_chats: i32) -> Result<bool, Error>;

    /// Recomputes every `active_chat_count` from assigned chats. Returns how
    /// many agents had drifted.
    async fn reconcile_workload(&self) -> Result<u64, Error>;
}

/// Writes that change a chat's status together with an agent's workload.
/// Each call is one transaction guarded by compare-and-set conditions; a lost
/// condition returns `Error::ConcurrentModification` and changes nothing.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// unassigned -> assigned. The agent must be online, below capacity and
    /// still carry `expected_count` active chats.
    async fn claim_chat(
        &self,
        chat_id: Uuid,
        agent_id: &str,
        expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Moves an assigned chat that has no first response yet between agents.
    /// Both counters must match their expected values; the recipient must be
    /// online and below capacity.
    async fn transfer_chat(
        &self,
        chat_id: Uuid,
        from_agent_id: &str,
        from_expected_count: i32,
        to_agent_id: &str,
        to_expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// assigned -> unassigned for a chat nobody has answered yet.
    async fn requeue_chat(&self, chat_id: Uuid, agent_id: &str) -> Result<(), Error>;

    /// Moves an open chat to `outcome` (resolved or closed), releasing the
    /// assigned agent's slot if any. Returns the released agent id.
    async fn finish_chat(
        &self,
        chat_id: Uuid,
        outcome: ChatStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<String>, Error>;
}

#[async_trait]
pub trait SlaBreachRepository: Send + Sync {
    /// Appends the event unless one already exists for its key. Returns
    /// whether a new record was written.
    async fn record_breach(&self, event: &SlaBreachEvent) -> Result<bool, Error>;

    /// Takes a delivery lease on an unnotified breach. Succeeds when no lease
    /// is held or the held one was taken at or before `now - lease`, so a
    /// claim abandoned by a cancelled scan is picked up again. Only the caller
    /// that wins may deliver.
    async fn claim_notification(
        &self,
        chat_id: Uuid,
        breach_type: BreachType,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, Error>;

    /// Flips `notified` false -> true after a successful delivery and drops
    /// the lease.
    async fn complete_notification(&self, chat_id: Uuid, breach_type: BreachType, at: DateTime<Utc>) -> Result<(), Error>;

    /// Drops the lease after a failed delivery so a later scan retries it.
    async fn release_notification(&self, chat_id: Uuid, breach_type: BreachType) -> Result<(), Error>;

    /// Breaches not yet delivered, leased or not.
    async fn list_unnotified(&self) -> Result<Vec<SlaBreachEvent>, Error>;
    async fn list_for_chat(&self, chat_id: Uuid) -> Result<Vec<SlaBreachEvent>, Error>;
}

#[async_trait]
pub trait SlaPolicyRepository: Send + Sync {
    async fn upsert_policy(&self, policy: &SlaPolicy) -> Result<(), Error>;
    async fn load_policies(&self) -> Result<SlaPolicySet, Error>;
}
