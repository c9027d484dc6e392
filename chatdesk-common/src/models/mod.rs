// File: chatdesk-common/src/models/mod.rs
pub mod agent;
pub mod assignment;
pub mod chat;
pub mod config;
pub mod sla;

pub use agent::{Agent, AgentAvailability};
pub use assignment::{AssignmentResult, ChatAssignment, ChatTransfer, RebalanceResult, TriggerSummary};
pub use chat::{ChatSession, ChatStatus};
pub use config::{SchedulerConfig, TieBreak};
pub use sla::{BreachType, SlaBreachEvent, SlaPolicy, SlaPolicySet};
