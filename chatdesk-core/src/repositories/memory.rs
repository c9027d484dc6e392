// src/repositories/memory.rs
//
// In-process backing store implementing every desk repository trait. A single
// lock guards the whole state, so each trait call is atomic the same way one
// Postgres transaction is.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use chatdesk_common::traits::repository_traits::{
    AgentRepository, ChatSessionRepository, SlaBreachRepository, SlaPolicyRepository, WorkloadStore,
};
use crate::Error;
use crate::models::{
    Agent, AgentAvailability, BreachType, ChatSession, ChatStatus, SlaBreachEvent, SlaPolicy, SlaPolicySet,
};

#[derive(Default)]
struct DeskState {
    chats: HashMap<Uuid, ChatSession>,
    agents: BTreeMap<String, Agent>,
    breaches: BTreeMap<(Uuid, BreachType), SlaBreachEvent>,
    /// Delivery leases by breach key, with the time each was taken.
    breach_claims: HashMap<(Uuid, BreachType), DateTime<Utc>>,
    policies: HashMap<String, SlaPolicy>,
}

#[derive(Clone, Default)]
pub struct MemoryDeskStore {
    state: Arc<Mutex<DeskState>>,
    offline: Arc<AtomicBool>,
}

impl MemoryDeskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `Error::TransientStore`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), Error> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::TransientStore("memory store is offline".into()))
        } else {
            Ok(())
        }
    }
}

fn lost(what: String) -> Error {
    Error::ConcurrentModification(what)
}

fn sorted_chats<'a>(chats: impl Iterator<Item = &'a ChatSession>) -> Vec<ChatSession> {
    let mut out: Vec<ChatSession> = chats.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.chat_id.cmp(&b.chat_id)));
    out
}

#[async_trait]
impl ChatSessionRepository for MemoryDeskStore {
    async fn insert_chat(&self, chat: &ChatSession) -> Result<(), Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.chats.contains_key(&chat.chat_id) {
            return Err(Error::InvalidState(format!("chat {} already exists", chat.chat_id)));
        }
        state.chats.insert(chat.chat_id, chat.clone());
        Ok(())
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatSession>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.chats.get(&chat_id).cloned())
    }

    async fn list_by_status(&self, statuses: &[ChatStatus]) -> Result<Vec<ChatSession>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(sorted_chats(state.chats.values().filter(|c| statuses.contains(&c.status))))
    }

    async fn list_assigned_to(&self, agent_id: &str) -> Result<Vec<ChatSession>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut chats: Vec<ChatSession> = state
            .chats
            .values()
            .filter(|c| c.status == ChatStatus::Assigned && c.assigned_agent_id.as_deref() == Some(agent_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at).then_with(|| a.chat_id.cmp(&b.chat_id)));
        Ok(chats)
    }

    async fn record_first_response(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state.chats.get_mut(&chat_id) {
            Some(chat) if chat.status.is_open() && chat.first_response_at.is_none() => {
                chat.first_response_at = Some(at);
                chat.last_message_at = chat.last_message_at.max(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_message(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state.chats.get_mut(&chat_id) {
            Some(chat) => {
                chat.last_message_at = chat.last_message_at.max(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AgentRepository for MemoryDeskStore {
    async fn upsert_agent(&self, agent: &Agent) -> Result<(), Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state.agents.get_mut(&agent.agent_id) {
            Some(existing) => {
                existing.display_name = agent.display_name.clone();
                existing.availability = agent.availability;
                existing.max_concurrent_chats = agent.max_concurrent_chats;
                existing.updated_at = agent.updated_at;
            }
            None => {
                let mut fresh = agent.clone();
                fresh.active_chat_count = 0;
                state.agents.insert(fresh.agent_id.clone(), fresh);
            }
        }
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.agents.get(agent_id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.agents.values().cloned().collect())
    }

    async fn set_availability(&self, agent_id: &str, availability: AgentAvailability) -> Result<bool, Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.availability = availability;
                agent.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_capacity(&self, agent_id: &str, max_concurrent_chats: i32) -> Result<bool, Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.max_concurrent_chats = max_concurrent_chats;
                agent.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reconcile_workload(&self) -> Result<u64, Error> {
        self.check_online()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut actual: HashMap<&str, i32> = HashMap::new();
        for chat in state.chats.values().filter(|c| c.status == ChatStatus::Assigned) {
            if let Some(agent_id) = chat.assigned_agent_id.as_deref() {
                *actual.entry(agent_id).or_default() += 1;
            }
        }

        let mut repaired = 0;
        for agent in state.agents.values_mut() {
            let count = actual.get(agent.agent_id.as_str()).copied().unwrap_or(0);
            if agent.active_chat_count != count {
                agent.active_chat_count = count;
                agent.updated_at = Utc::now();
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}

#[async_trait]
impl WorkloadStore for MemoryDeskStore {
    async fn claim_chat(
        &self,
        chat_id: Uuid,
        agent_id: &str,
        expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.check_online()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let chat = state.chats.get_mut(&chat_id)
            .filter(|c| c.status == ChatStatus::Unassigned)
            .ok_or_else(|| lost(format!("chat {} is no longer unassigned", chat_id)))?;
        let agent = state.agents.get_mut(agent_id)
            .filter(|a| a.active_chat_count == expected_count && a.is_eligible())
            .ok_or_else(|| lost(format!(
                "agent {} changed since it was read with {} active chats",
                agent_id, expected_count
            )))?;

        chat.status = ChatStatus::Assigned;
        chat.assigned_agent_id = Some(agent_id.to_string());
        chat.assigned_at = Some(at);
        agent.active_chat_count += 1;
        agent.updated_at = at;
        Ok(())
    }

    async fn transfer_chat(
        &self,
        chat_id: Uuid,
        from_agent_id: &str,
        from_expected_count: i32,
        to_agent_id: &str,
        to_expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.check_online()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let movable = state.chats.get(&chat_id).is_some_and(|c| {
            c.is_movable() && c.assigned_agent_id.as_deref() == Some(from_agent_id)
        });
        if !movable {
            return Err(lost(format!("chat {} can no longer move off {}", chat_id, from_agent_id)));
        }
        let donor_ok = state.agents.get(from_agent_id)
            .is_some_and(|a| a.active_chat_count == from_expected_count && a.active_chat_count > 0);
        if !donor_ok {
            return Err(lost(format!("donor {} workload changed", from_agent_id)));
        }
        let recipient_ok = state.agents.get(to_agent_id)
            .is_some_and(|a| a.active_chat_count == to_expected_count && a.is_eligible());
        if !recipient_ok {
            return Err(lost(format!("recipient {} workload changed", to_agent_id)));
        }

        if let Some(chat) = state.chats.get_mut(&chat_id) {
            chat.assigned_agent_id = Some(to_agent_id.to_string());
            chat.assigned_at = Some(at);
        }
        if let Some(donor) = state.agents.get_mut(from_agent_id) {
            donor.active_chat_count -= 1;
            donor.updated_at = at;
        }
        if let Some(recipient) = state.agents.get_mut(to_agent_id) {
            recipient.active_chat_count += 1;
            recipient.updated_at = at;
        }
        Ok(())
    }

    async fn requeue_chat(&self, chat_id: Uuid, agent_id: &str) -> Result<(), Error> {
        self.check_online()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let chat = state.chats.get_mut(&chat_id)
            .filter(|c| c.is_movable() && c.assigned_agent_id.as_deref() == Some(agent_id))
            .ok_or_else(|| lost(format!("chat {} can no longer be requeued from {}", chat_id, agent_id)))?;

        chat.status = ChatStatus::Unassigned;
        chat.assigned_agent_id = None;
        chat.assigned_at = None;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.active_chat_count = (agent.active_chat_count - 1).max(0);
            agent.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn finish_chat(
        &self,
        chat_id: Uuid,
        outcome: ChatStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<String>, Error> {
        if outcome.is_open() {
            return Err(Error::InvalidState(format!("{} is not a terminal chat status", outcome)));
        }
        self.check_online()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let chat = state.chats.get_mut(&chat_id)
            .filter(|c| c.status.is_open())
            .ok_or_else(|| lost(format!("chat {} is not open", chat_id)))?;

        let released = match chat.status {
            ChatStatus::Assigned => chat.assigned_agent_id.clone(),
            _ => None,
        };
        chat.status = outcome;
        chat.closed_at = Some(at);

        if let Some(agent) = released.as_deref().and_then(|id| state.agents.get_mut(id)) {
            agent.active_chat_count = (agent.active_chat_count - 1).max(0);
            agent.updated_at = at;
        }
        Ok(released)
    }
}

#[async_trait]
impl SlaBreachRepository for MemoryDeskStore {
    async fn record_breach(&self, event: &SlaBreachEvent) -> Result<bool, Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.breaches.contains_key(&event.key()) {
            return Ok(false);
        }
        state.breaches.insert(event.key(), event.clone());
        Ok(true)
    }

    async fn claim_notification(
        &self,
        chat_id: Uuid,
        breach_type: BreachType,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<bool, Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let key = (chat_id, breach_type);
        match state.breaches.get(&key) {
            Some(event) if !event.notified => {}
            _ => return Ok(false),
        }
        if let Some(claimed_at) = state.breach_claims.get(&key) {
            if *claimed_at > now - lease {
                return Ok(false);
            }
        }
        state.breach_claims.insert(key, now);
        Ok(true)
    }

    async fn complete_notification(&self, chat_id: Uuid, breach_type: BreachType, _at: DateTime<Utc>) -> Result<(), Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let key = (chat_id, breach_type);
        state.breach_claims.remove(&key);
        if let Some(event) = state.breaches.get_mut(&key) {
            event.notified = true;
        }
        Ok(())
    }

    async fn release_notification(&self, chat_id: Uuid, breach_type: BreachType) -> Result<(), Error> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        state.breach_claims.remove(&(chat_id, breach_type));
        Ok(())
    }

    async fn list_unnotified(&self) -> Result<Vec<SlaBreachEvent>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut events: Vec<SlaBreachEvent> = state.breaches.values().filter(|e| !e.notified).cloned().collect();
        events.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.key().cmp(&b.key())));
        Ok(events)
    }

    async fn list_for_chat(&self, chat_id: Uuid) -> Result<Vec<SlaBreachEvent>, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.breaches.values().filter(|e| e.chat_id == chat_id).cloned().collect())
    }
}

#[async_trait]
impl SlaPolicyRepository for MemoryDeskStore {
    async fn upsert_policy(&self, policy: &SlaPolicy) -> Result<(), Error> {
        self.check_online()?;
        if policy.first_response_threshold <= chrono::Duration::zero()
            || policy.resolution_threshold <= chrono::Duration::zero()
        {
            return Err(Error::Configuration(format!(
                "SLA thresholds for scope '{}' must be positive",
                policy.scope()
            )));
        }
        let mut state = self.state.lock().await;
        state.policies.insert(policy.scope().to_string(), policy.clone());
        Ok(())
    }

    async fn load_policies(&self) -> Result<SlaPolicySet, Error> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(SlaPolicySet::from_policies(state.policies.values().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn online_agent(store: &MemoryDeskStore, id: &str, max: i32) -> Result<(), Error> {
        let mut agent = Agent::new(id, id, max);
        agent.availability = AgentAvailability::Online;
        store.upsert_agent(&agent).await
    }

    #[tokio::test]
    async fn test_claim_is_all_or_nothing() -> Result<(), Error> {
        let store = MemoryDeskStore::new();
        online_agent(&store, "agent-a", 1).await?;
        let chat = ChatSession::new("member", None, Utc::now());
        store.insert_chat(&chat).await?;

        // Stale expected count: nothing changes.
        let err = store.claim_chat(chat.chat_id, "agent-a", 3, Utc::now()).await.unwrap_err();
        assert!(err.is_concurrent_modification());
        let unchanged = store.get_chat(chat.chat_id).await?.unwrap();
        assert_eq!(unchanged.status, ChatStatus::Unassigned);
        assert_eq!(store.get_agent("agent-a").await?.unwrap().active_chat_count, 0);

        store.claim_chat(chat.chat_id, "agent-a", 0, Utc::now()).await?;
        let claimed = store.get_chat(chat.chat_id).await?.unwrap();
        assert_eq!(claimed.assigned_agent_id.as_deref(), Some("agent-a"));
        assert!(claimed.check_invariants().is_ok());
        assert_eq!(store.get_agent("agent-a").await?.unwrap().active_chat_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_keeps_workload() -> Result<(), Error> {
        let store = MemoryDeskStore::new();
        online_agent(&store, "agent-a", 4).await?;
        let chat = ChatSession::new("member", None, Utc::now());
        store.insert_chat(&chat).await?;
        store.claim_chat(chat.chat_id, "agent-a", 0, Utc::now()).await?;

        let mut renamed = Agent::new("agent-a", "Alice", 6);
        renamed.availability = AgentAvailability::Away;
        store.upsert_agent(&renamed).await?;

        let agent = store.get_agent("agent-a").await?.unwrap();
        assert_eq!(agent.display_name, "Alice");
        assert_eq!(agent.max_concurrent_chats, 6);
        assert_eq!(agent.active_chat_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_breach_lease_expires() -> Result<(), Error> {
        let store = MemoryDeskStore::new();
        let t0 = Utc::now();
        let lease = chrono::Duration::minutes(1);
        let chat = ChatSession::new("member", None, t0);
        store.insert_chat(&chat).await?;
        let key = (chat.chat_id, BreachType::FirstResponse);
        store.record_breach(&SlaBreachEvent::new(key.0, key.1, t0)).await?;

        assert!(store.claim_notification(key.0, key.1, t0, lease).await?);
        assert!(!store.claim_notification(key.0, key.1, t0 + chrono::Duration::seconds(30), lease).await?);
        // Leased but undelivered: still pending.
        assert_eq!(store.list_unnotified().await?.len(), 1);

        // Abandoned lease is taken over once it runs out.
        assert!(store.claim_notification(key.0, key.1, t0 + lease, lease).await?);
        store.complete_notification(key.0, key.1, t0 + lease).await?;
        assert!(store.list_unnotified().await?.is_empty());
        assert!(!store.claim_notification(key.0, key.1, t0 + chrono::Duration::hours(1), lease).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_store_is_transient() {
        let store = MemoryDeskStore::new();
        store.set_offline(true);
        let err = store.list_agents().await.unwrap_err();
        assert!(err.is_transient());
    }
}
