use async_trait::async_trait;
use crate::error::Error;
use crate::models::{AssignmentResult, RebalanceResult, SlaBreachEvent};

/// Hand-off point to whatever delivers desk notifications (staff channel,
/// dashboard, ...). Delivery itself lives outside this workspace.
#[async_trait]
pub trait DeskNotifier: Send + Sync {
    async fn notify_breach(&self, event: &SlaBreachEvent) -> Result<(), Error>;

    async fn notify_assignments(&self, result: &AssignmentResult) -> Result<(), Error>;

    async fn notify_rebalance(&self, _result: &RebalanceResult) -> Result<(), Error> {
        Ok(())
    }
}
