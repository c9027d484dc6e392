//! src/eventbus/event_logger.rs
//!
//! Subscribes to the EventBus and writes every desk event to the log. Exits
//! when the bus shuts down or every sender is gone.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::eventbus::{DeskEvent, EventBus};

pub async fn spawn_event_logger_task(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(None).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("Desk event logger started");
        loop {
            tokio::select! {
                biased;
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => log_event(&event),
                        None => {
                            info!("Desk event logger channel closed => break from loop.");
                            break;
                        }
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Desk event logger shutting down => break from loop.");
                        break;
                    }
                }
            }
        }
    })
}

fn log_event(event: &DeskEvent) {
    let kind = event.event_type();
    match event {
        DeskEvent::SlaBreach(breach) => warn!(
            kind,
            chat_id = %breach.chat_id,
            breach_type = %breach.breach_type,
            detected_at = %breach.detected_at,
            "SLA breached"
        ),
        DeskEvent::ChatsAssigned(result) => info!(
            kind,
            assigned = result.assigned_count(),
            still_unassigned = result.still_unassigned,
            "chats assigned"
        ),
        DeskEvent::ChatsRebalanced(result) => info!(kind, moved = result.moved_count(), "chats rebalanced"),
        DeskEvent::SystemMessage(text) => info!(kind, "{}", text),
    }
}
