// src/repositories/mod.rs

pub mod memory;
pub mod postgres;

pub use chatdesk_common::traits::repository_traits::{
    AgentRepository, ChatSessionRepository, SlaBreachRepository, SlaPolicyRepository, WorkloadStore,
};

pub use memory::MemoryDeskStore;
pub use postgres::{
    PostgresAgentRepository, PostgresChatSessionRepository, PostgresSlaBreachRepository,
    PostgresSlaPolicyRepository, PostgresWorkloadStore,
};
