// File: chatdesk-common/src/models/config.rs

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// How the assignment engine orders agents that carry the same workload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Lowest agent id wins.
    #[default]
    AgentId,
    /// Most free slots wins, then lowest agent id.
    MostHeadroom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Period of the built-in cycle task. Zero disables it (external cron only).
    pub cycle_interval: Duration,
    /// A cycle running longer than this is abandoned; committed work stays.
    pub cycle_timeout: Duration,
    /// Distance from the mean workload beyond which an agent donates or receives.
    pub imbalance_threshold: f64,
    pub tie_break: TieBreak,
    /// Extra attempts for a cycle whose stages failed transiently.
    pub retry_attempts: u32,
    /// First retry delay; doubled on each further attempt.
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(120),
            cycle_timeout: Duration::from_secs(60),
            imbalance_threshold: 2.0,
            tie_break: TieBreak::AgentId,
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl SchedulerConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}
