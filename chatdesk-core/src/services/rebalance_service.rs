// File: src/services/rebalance_service.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::Error;
use crate::models::{Agent, ChatSession, ChatTransfer, RebalanceResult};
use crate::services::agent_registry::AgentRegistry;
use crate::services::chat_queue::ChatQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub from_agent_id: String,
    pub to_agent_id: String,
}

/// Mean active count over online agents; `None` when fewer than two are online.
pub fn online_mean(agents: &[Agent]) -> Option<f64> {
    let online: Vec<&Agent> = agents.iter().filter(|a| a.is_online()).collect();
    if online.len() <= 1 {
        return None;
    }
    let total: i64 = online.iter().map(|a| i64::from(a.active_chat_count)).sum();
    Some(total as f64 / online.len() as f64)
}

/// Moves that bring donors (above `mean + threshold`) down and recipients
/// (below `mean - threshold`) up. `movable` caps how many chats each donor
/// can give. The mean is fixed at the start of the pass.
pub fn plan_moves(agents: &[Agent], movable: &HashMap<String, usize>, threshold: f64) -> Vec<PlannedMove> {
    let Some(mean) = online_mean(agents) else {
        return Vec::new();
    };

    let mut online: Vec<Agent> = agents.iter().filter(|a| a.is_online()).cloned().collect();
    let mut left: HashMap<&str, usize> = HashMap::new();
    for (agent_id, n) in movable {
        left.insert(agent_id.as_str(), *n);
    }

    let mut moves = Vec::new();
    loop {
        let donor = online
            .iter()
            .enumerate()
            .filter(|(_, a)| f64::from(a.active_chat_count) > mean + threshold)
            .filter(|(_, a)| left.get(a.agent_id.as_str()).copied().unwrap_or(0) > 0)
            .max_by(|(_, x), (_, y)| {
                x.active_chat_count
                    .cmp(&y.active_chat_count)
                    .then_with(|| y.agent_id.cmp(&x.agent_id))
            })
            .map(|(i, _)| i);

        let recipient = online
            .iter()
            .enumerate()
            .filter(|(_, a)| f64::from(a.active_chat_count) < mean - threshold && a.has_capacity())
            .min_by_key(|(_, a)| (a.active_chat_count, a.agent_id.as_str()))
            .map(|(i, _)| i);

        let (Some(d), Some(r)) = (donor, recipient) else {
            break;
        };

        online[d].active_chat_count -= 1;
        online[r].active_chat_count += 1;
        if let Some(n) = left.get_mut(online[d].agent_id.as_str()) {
            *n -= 1;
        }
        moves.push(PlannedMove {
            from_agent_id: online[d].agent_id.clone(),
            to_agent_id: online[r].agent_id.clone(),
        });
    }
    moves
}

pub struct RebalancingEngine {
    queue: Arc<ChatQueue>,
    registry: Arc<AgentRegistry>,
    imbalance_threshold: f64,
    lock: Mutex<()>,
}

impl RebalancingEngine {
    pub fn new(queue: Arc<ChatQueue>, registry: Arc<AgentRegistry>, imbalance_threshold: f64) -> Self {
        Self {
            queue,
            registry,
            imbalance_threshold,
            lock: Mutex::new(()),
        }
    }

    pub async fn rebalance(&self) -> Result<RebalanceResult, Error> {
        self.rebalance_at(Utc::now()).await
    }

    /// Donors give up their most recently assigned chats that nobody has
    /// answered. A lost compare-and-set ends the pass; the next cycle starts
    /// from fresh state.
    #[instrument(skip(self))]
    pub async fn rebalance_at(&self, now: DateTime<Utc>) -> Result<RebalanceResult, Error> {
        let _guard = self.lock.lock().await;
        let mut result = RebalanceResult::default();

        let agents = self.registry.online_agents().await?;
        let Some(mean) = online_mean(&agents) else {
            debug!("fewer than two agents online; nothing to rebalance");
            return Ok(result);
        };

        let mut donor_chats: HashMap<String, VecDeque<ChatSession>> = HashMap::new();
        for agent in agents.iter().filter(|a| f64::from(a.active_chat_count) > mean + self.imbalance_threshold) {
            let chats: VecDeque<ChatSession> = self
                .queue
                .assigned_to(&agent.agent_id)
                .await?
                .into_iter()
                .filter(ChatSession::is_movable)
                .collect();
            donor_chats.insert(agent.agent_id.clone(), chats);
        }

        let movable: HashMap<String, usize> = donor_chats.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        let plan = plan_moves(&agents, &movable, self.imbalance_threshold);
        if plan.is_empty() {
            debug!(mean, "workload already balanced");
            return Ok(result);
        }

        let mut current: HashMap<String, Agent> = agents.into_iter().map(|a| (a.agent_id.clone(), a)).collect();

        for step in plan {
            let Some(chat) = donor_chats.get_mut(&step.from_agent_id).and_then(VecDeque::pop_front) else {
                break;
            };
            let (Some(from), Some(to)) = (current.get(&step.from_agent_id), current.get(&step.to_agent_id)) else {
                break;
            };

            match self.registry.transfer(chat.chat_id, from, to, now).await {
                Ok(()) => {
                    result.transfers.push(ChatTransfer {
                        chat_id: chat.chat_id,
                        from_agent_id: step.from_agent_id.clone(),
                        to_agent_id: step.to_agent_id.clone(),
                        transferred_at: now,
                    });
                    if let Some(a) = current.get_mut(&step.from_agent_id) {
                        a.active_chat_count -= 1;
                    }
                    if let Some(a) = current.get_mut(&step.to_agent_id) {
                        a.active_chat_count += 1;
                    }
                }
                Err(e) if e.is_concurrent_modification() => {
                    debug!(chat_id = %chat.chat_id, "transfer lost: {}; stopping this pass", e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!(moved = result.moved_count(), mean, "rebalance pass finished");
        Ok(result)
    }
}
