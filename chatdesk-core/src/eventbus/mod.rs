//! src/eventbus/mod.rs
//!
//! In-process event bus with guaranteed delivery to every subscriber via
//! bounded MPSC queues. Desk notifications are published here; whatever
//! delivers them to staff subscribes.

pub mod event_logger;
pub mod notifier;

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use crate::models::{AssignmentResult, RebalanceResult, SlaBreachEvent};

pub use event_logger::spawn_event_logger_task;
pub use notifier::EventBusNotifier;

#[derive(Debug, Clone)]
pub enum DeskEvent {
    SlaBreach(SlaBreachEvent),

    /// Summary of one assignment pass that placed at least one chat.
    ChatsAssigned(AssignmentResult),

    ChatsRebalanced(RebalanceResult),

    SystemMessage(String),
}

impl DeskEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DeskEvent::SlaBreach(_) => "sla.breach",
            DeskEvent::ChatsAssigned(_) => "chats.assigned",
            DeskEvent::ChatsRebalanced(_) => "chats.rebalanced",
            DeskEvent::SystemMessage(_) => "system_message",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<DeskEvent>`.
///
/// - A full subscriber buffer makes `publish` wait (backpressure).
/// - A dropped `Receiver` is skipped; the remaining subscribers still get the event.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<DeskEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

const DEFAULT_BUFFER_SIZE: usize = 1024;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<DeskEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers. Returns how many received it.
    pub async fn publish(&self, event: DeskEvent) -> usize {
        let senders = {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
            subs.clone()
        };
        let mut delivered = 0;
        for s in senders {
            if s.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn publish_system(&self, text: &str) -> usize {
        self.publish(DeskEvent::SystemMessage(text.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        assert_eq!(bus.publish_system("hello").await, 2);

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.expect("subscriber should get event") {
                DeskEvent::SystemMessage(txt) => assert_eq!(txt, "hello"),
                other => panic!("wrong event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_backpressure_does_not_drop() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await;

        bus.publish_system("first").await;

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.expect("expected first message");
            let second = rx.recv().await.expect("expected second message");
            (first, second)
        });

        let publish_res = timeout(Duration::from_millis(500), bus.publish_system("second")).await;
        assert!(publish_res.is_ok(), "publish should eventually unblock");

        let (evt1, evt2) = handle.await.unwrap();
        assert!(matches!(evt1, DeskEvent::SystemMessage(ref t) if t == "first"));
        assert!(matches!(evt2, DeskEvent::SystemMessage(ref t) if t == "second"));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(1)).await;
        drop(rx);
        let mut live = bus.subscribe(Some(1)).await;

        assert_eq!(bus.publish_system("still here").await, 1);
        assert!(live.recv().await.is_some());
    }
}
