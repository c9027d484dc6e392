// src/repositories/postgres/mod.rs

pub mod agents;
pub mod chat_sessions;
pub mod sla_breaches;
pub mod sla_policies;
pub mod workload;

pub use agents::PostgresAgentRepository;
pub use chat_sessions::PostgresChatSessionRepository;
pub use sla_breaches::PostgresSlaBreachRepository;
pub use sla_policies::PostgresSlaPolicyRepository;
pub use workload::PostgresWorkloadStore;
