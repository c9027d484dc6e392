// File: src/services/mod.rs

pub mod agent_registry;
pub mod chat_queue;
pub mod assignment_service;
pub mod rebalance_service;
pub mod sla_monitor;
pub mod desk;

pub use agent_registry::AgentRegistry;
pub use chat_queue::ChatQueue;
pub use assignment_service::AssignmentEngine;
pub use rebalance_service::RebalancingEngine;
pub use sla_monitor::SlaMonitor;
pub use desk::{DeskServices, DeskStores};
