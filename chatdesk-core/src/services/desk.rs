// File: src/services/desk.rs

use std::sync::Arc;
use sqlx::{Pool, Postgres};

use chatdesk_common::traits::notifier_traits::DeskNotifier;
use crate::models::SchedulerConfig;
use crate::repositories::{
    AgentRepository, ChatSessionRepository, MemoryDeskStore, PostgresAgentRepository,
    PostgresChatSessionRepository, PostgresSlaBreachRepository, PostgresSlaPolicyRepository,
    PostgresWorkloadStore, SlaBreachRepository, SlaPolicyRepository, WorkloadStore,
};
use crate::services::{AgentRegistry, AssignmentEngine, ChatQueue, RebalancingEngine, SlaMonitor};
use crate::services::sla_monitor::DEFAULT_CLAIM_LEASE_SECS;
use crate::tasks::DeskScheduler;

/// The persistence seams every desk component is built on.
#[derive(Clone)]
pub struct DeskStores {
    pub chats: Arc<dyn ChatSessionRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub workload: Arc<dyn WorkloadStore>,
    pub breaches: Arc<dyn SlaBreachRepository>,
    pub policies: Arc<dyn SlaPolicyRepository>,
}

impl DeskStores {
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            chats: Arc::new(PostgresChatSessionRepository::new(pool.clone())),
            agents: Arc::new(PostgresAgentRepository::new(pool.clone())),
            workload: Arc::new(PostgresWorkloadStore::new(pool.clone())),
            breaches: Arc::new(PostgresSlaBreachRepository::new(pool.clone())),
            policies: Arc::new(PostgresSlaPolicyRepository::new(pool)),
        }
    }

    pub fn memory(store: &MemoryDeskStore) -> Self {
        Self {
            chats: Arc::new(store.clone()),
            agents: Arc::new(store.clone()),
            workload: Arc::new(store.clone()),
            breaches: Arc::new(store.clone()),
            policies: Arc::new(store.clone()),
        }
    }
}

/// Every desk component, wired once.
#[derive(Clone)]
pub struct DeskServices {
    pub stores: DeskStores,
    pub registry: Arc<AgentRegistry>,
    pub queue: Arc<ChatQueue>,
    pub assignment: Arc<AssignmentEngine>,
    pub rebalancing: Arc<RebalancingEngine>,
    pub sla: Arc<SlaMonitor>,
    pub scheduler: Arc<DeskScheduler>,
}

impl DeskServices {
    pub fn new(stores: DeskStores, notifier: Arc<dyn DeskNotifier>, config: SchedulerConfig) -> Self {
        let registry = Arc::new(AgentRegistry::new(
            stores.agents.clone(),
            stores.chats.clone(),
            stores.workload.clone(),
        ));
        let queue = Arc::new(ChatQueue::new(stores.chats.clone(), registry.clone()));
        let assignment = Arc::new(AssignmentEngine::new(queue.clone(), registry.clone(), config.tie_break));
        let rebalancing = Arc::new(RebalancingEngine::new(
            queue.clone(),
            registry.clone(),
            config.imbalance_threshold,
        ));
        // A lease must outlive any scan the cycle timeout lets run.
        let lease = chrono::Duration::from_std(config.cycle_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_CLAIM_LEASE_SECS))
            .max(chrono::Duration::seconds(DEFAULT_CLAIM_LEASE_SECS));
        let sla = Arc::new(
            SlaMonitor::new(
                queue.clone(),
                stores.breaches.clone(),
                stores.policies.clone(),
                notifier.clone(),
            )
            .with_claim_lease(lease),
        );
        let scheduler = Arc::new(DeskScheduler::new(
            assignment.clone(),
            rebalancing.clone(),
            sla.clone(),
            notifier,
            config,
        ));

        Self {
            stores,
            registry,
            queue,
            assignment,
            rebalancing,
            sla,
            scheduler,
        }
    }
}
