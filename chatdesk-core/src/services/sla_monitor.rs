// File: src/services/sla_monitor.rs
//
// Observes chat timestamps only. Breach records are keyed by
// (chat_id, breach_type): recording is insert-if-absent and delivery is gated
// by a compare-and-set lease, so overlapping scans cannot duplicate either one.
// `notified` flips only after the notifier accepted the event; a lease left
// behind by a cancelled scan expires and the breach is delivered again.

use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use chatdesk_common::traits::notifier_traits::DeskNotifier;
use crate::Error;
use crate::models::{BreachType, ChatSession, ChatStatus, SlaBreachEvent, SlaPolicy, SlaPolicySet};
use crate::repositories::{SlaBreachRepository, SlaPolicyRepository};
use crate::services::chat_queue::ChatQueue;

/// Breaches `chat` currently shows under `policy`.
pub fn breaches_for_chat(chat: &ChatSession, policy: &SlaPolicy, now: DateTime<Utc>) -> Vec<BreachType> {
    let mut found = Vec::new();
    if chat.status.is_open()
        && chat.first_response_at.is_none()
        && now - chat.created_at > policy.first_response_threshold
    {
        found.push(BreachType::FirstResponse);
    }
    if chat.status == ChatStatus::Assigned {
        if let Some(assigned_at) = chat.assigned_at {
            if now - assigned_at > policy.resolution_threshold {
                found.push(BreachType::Resolution);
            }
        }
    }
    found
}

/// Candidate events for every chat that has an applicable policy. Also returns
/// how many chats had none.
pub fn detect_breaches(
    chats: &[ChatSession],
    policies: &SlaPolicySet,
    now: DateTime<Utc>,
) -> (Vec<SlaBreachEvent>, usize) {
    let mut events = Vec::new();
    let mut uncovered = 0;
    for chat in chats {
        let Some(policy) = policies.policy_for(chat.category.as_deref()) else {
            uncovered += 1;
            continue;
        };
        for breach_type in breaches_for_chat(chat, policy, now) {
            events.push(SlaBreachEvent::new(chat.chat_id, breach_type, now));
        }
    }
    (events, uncovered)
}

/// How long a delivery claim is honoured before another scan may take it.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 300;

pub struct SlaMonitor {
    queue: Arc<ChatQueue>,
    breaches: Arc<dyn SlaBreachRepository>,
    policies: Arc<dyn SlaPolicyRepository>,
    notifier: Arc<dyn DeskNotifier>,
    claim_lease: Duration,
    lock: Mutex<()>,
}

impl SlaMonitor {
    pub fn new(
        queue: Arc<ChatQueue>,
        breaches: Arc<dyn SlaBreachRepository>,
        policies: Arc<dyn SlaPolicyRepository>,
        notifier: Arc<dyn DeskNotifier>,
    ) -> Self {
        Self {
            queue,
            breaches,
            policies,
            notifier,
            claim_lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS),
            lock: Mutex::new(()),
        }
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn claim_lease(&self) -> Duration {
        self.claim_lease
    }

    /// Scan against one policy applied to every chat.
    pub async fn scan_breaches(&self, policy: &SlaPolicy) -> Result<Vec<SlaBreachEvent>, Error> {
        self.scan_with_policies_at(&SlaPolicySet::with_global(policy.clone()), Utc::now()).await
    }

    pub async fn scan_breaches_at(&self, policy: &SlaPolicy, now: DateTime<Utc>) -> Result<Vec<SlaBreachEvent>, Error> {
        self.scan_with_policies_at(&SlaPolicySet::with_global(policy.clone()), now).await
    }

    /// Scan against the stored policies.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<Vec<SlaBreachEvent>, Error> {
        let policies = self.policies.load_policies().await?;
        if policies.is_empty() {
            return Err(Error::Configuration("no SLA policy configured".into()));
        }
        self.scan_with_policies_at(&policies, now).await
    }

    /// Records newly detected breaches, then delivers every breach still
    /// waiting for a notification. Returns the breaches first recorded by
    /// this scan.
    #[instrument(skip(self, policies))]
    pub async fn scan_with_policies_at(
        &self,
        policies: &SlaPolicySet,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlaBreachEvent>, Error> {
        let _guard = self.lock.lock().await;

        let chats = self.queue.active().await?;
        let (candidates, uncovered) = detect_breaches(&chats, policies, now);
        if uncovered > 0 {
            warn!(uncovered, "chats skipped: no SLA policy for their category");
        }

        let mut recorded = Vec::new();
        for event in candidates {
            if self.breaches.record_breach(&event).await? {
                recorded.push(event);
            }
        }

        let (delivered, failed) = self.deliver_pending(now).await?;
        for event in recorded.iter_mut() {
            // Reflect what the delivery pass did for this scan's own events.
            if let Some(stored) = self
                .breaches
                .list_for_chat(event.chat_id)
                .await?
                .into_iter()
                .find(|e| e.breach_type == event.breach_type)
            {
                event.notified = stored.notified;
            }
        }

        info!(
            scanned = chats.len(),
            new_breaches = recorded.len(),
            delivered,
            failed,
            "SLA scan finished"
        );
        Ok(recorded)
    }

    /// Leases and delivers each unnotified breach. A failed delivery gives the
    /// lease back so a later scan retries it.
    async fn deliver_pending(&self, now: DateTime<Utc>) -> Result<(usize, usize), Error> {
        let mut delivered = 0;
        let mut failed = 0;

        for event in self.breaches.list_unnotified().await? {
            if !self
                .breaches
                .claim_notification(event.chat_id, event.breach_type, now, self.claim_lease)
                .await?
            {
                debug!(chat_id = %event.chat_id, breach_type = %event.breach_type, "delivery already leased");
                continue;
            }
            let mut claimed = event.clone();
            claimed.notified = true;

            match self.notifier.notify_breach(&claimed).await {
                Ok(()) => {
                    self.breaches.complete_notification(event.chat_id, event.breach_type, now).await?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        chat_id = %event.chat_id,
                        breach_type = %event.breach_type,
                        "breach notification failed, will retry: {}", e
                    );
                    self.breaches.release_notification(event.chat_id, event.breach_type).await?;
                    failed += 1;
                }
            }
        }
        Ok((delivered, failed))
    }
}
