//! src/eventbus/notifier.rs

use async_trait::async_trait;
use tracing::debug;

use chatdesk_common::traits::notifier_traits::DeskNotifier;
use crate::Error;
use crate::eventbus::{DeskEvent, EventBus};
use crate::models::{AssignmentResult, RebalanceResult, SlaBreachEvent};

/// Default notifier: publishes desk notifications onto the event bus.
#[derive(Clone)]
pub struct EventBusNotifier {
    bus: EventBus,
}

impl EventBusNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl DeskNotifier for EventBusNotifier {
    async fn notify_breach(&self, event: &SlaBreachEvent) -> Result<(), Error> {
        if self.bus.is_shutdown() {
            return Err(Error::EventBus("event bus is shut down".into()));
        }
        // Nobody listening is a failed delivery; the breach stays pending.
        let delivered = self.bus.publish(DeskEvent::SlaBreach(event.clone())).await;
        if delivered == 0 {
            return Err(Error::EventBus(format!(
                "no subscriber received {} breach for chat {}",
                event.breach_type, event.chat_id
            )));
        }
        Ok(())
    }

    async fn notify_assignments(&self, result: &AssignmentResult) -> Result<(), Error> {
        if result.assignments.is_empty() {
            return Ok(());
        }
        let delivered = self.bus.publish(DeskEvent::ChatsAssigned(result.clone())).await;
        debug!(delivered, assigned = result.assigned_count(), "assignment summary published");
        Ok(())
    }

    async fn notify_rebalance(&self, result: &RebalanceResult) -> Result<(), Error> {
        if result.transfers.is_empty() {
            return Ok(());
        }
        self.bus.publish(DeskEvent::ChatsRebalanced(result.clone())).await;
        Ok(())
    }
}
