//! chatdesk-server/src/context.rs
//!
//! Builds the store, the desk services and the event bus from command-line
//! arguments.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use chatdesk_common::traits::notifier_traits::DeskNotifier;
use chatdesk_core::db::Database;
use chatdesk_core::eventbus::{EventBus, EventBusNotifier};
use chatdesk_core::models::{SchedulerConfig, SlaPolicy, TieBreak};
use chatdesk_core::repositories::MemoryDeskStore;
use chatdesk_core::services::{DeskServices, DeskStores};
use chatdesk_core::Error;

use crate::Args;

pub struct ServerContext {
    /// `None` when running on the in-memory store.
    pub db: Option<Database>,
    pub event_bus: EventBus,
    pub desk: DeskServices,
}

impl ServerContext {
    pub async fn new(args: &Args) -> Result<Self, Error> {
        let config = scheduler_config(args)?;
        let seed_policy = seed_policy(args)?;

        let (db, stores) = if args.in_memory {
            info!("Using the in-memory desk store; state is lost on exit.");
            (None, DeskStores::memory(&MemoryDeskStore::new()))
        } else {
            let url = match &args.database_url {
                Some(url) => url.clone(),
                None => std::env::var("DATABASE_URL").map_err(|_| {
                    Error::Configuration("set --database-url or DATABASE_URL (or pass --in-memory)".into())
                })?,
            };
            let db = Database::new(&url, args.max_connections).await?;
            db.migrate().await?;
            let stores = DeskStores::postgres(db.pool().clone());
            (Some(db), stores)
        };

        let event_bus = EventBus::new();
        let notifier: Arc<dyn DeskNotifier> = Arc::new(EventBusNotifier::new(event_bus.clone()));
        let desk = DeskServices::new(stores, notifier, config);

        if let Some(policy) = seed_policy {
            desk.stores.policies.upsert_policy(&policy).await?;
            info!(
                first_response = %policy.first_response_threshold,
                resolution = %policy.resolution_threshold,
                "seeded global SLA policy"
            );
        }

        desk.registry.reconcile_workload().await?;

        Ok(Self { db, event_bus, desk })
    }
}

pub fn parse_tie_break(raw: &str) -> Result<TieBreak, Error> {
    match raw.to_ascii_lowercase().replace('_', "-").as_str() {
        "agent-id" => Ok(TieBreak::AgentId),
        "most-headroom" => Ok(TieBreak::MostHeadroom),
        other => Err(Error::Configuration(format!("unknown tie-break '{}'", other))),
    }
}

pub fn scheduler_config(args: &Args) -> Result<SchedulerConfig, Error> {
    if !(args.imbalance_threshold.is_finite() && args.imbalance_threshold >= 0.0) {
        return Err(Error::Configuration(format!(
            "imbalance threshold must be a non-negative number, got {}",
            args.imbalance_threshold
        )));
    }
    if args.cycle_timeout_secs == 0 {
        return Err(Error::Configuration("cycle timeout must be positive".into()));
    }

    Ok(SchedulerConfig {
        cycle_interval: Duration::from_secs(args.cycle_interval_secs),
        cycle_timeout: Duration::from_secs(args.cycle_timeout_secs),
        imbalance_threshold: args.imbalance_threshold,
        tie_break: parse_tie_break(&args.tie_break)?,
        retry_attempts: args.retry_attempts,
        retry_backoff: Duration::from_millis(args.retry_backoff_ms),
    })
}

/// Both SLA flags or neither.
pub fn seed_policy(args: &Args) -> Result<Option<SlaPolicy>, Error> {
    match (args.sla_first_response_mins, args.sla_resolution_mins) {
        (None, None) => Ok(None),
        (Some(first), Some(resolution)) if first > 0 && resolution > 0 => Ok(Some(SlaPolicy::global(
            chrono::Duration::minutes(first),
            chrono::Duration::minutes(resolution),
        ))),
        (Some(_), Some(_)) => Err(Error::Configuration("SLA minutes must be positive".into())),
        _ => Err(Error::Configuration(
            "--sla-first-response-mins and --sla-resolution-mins go together".into(),
        )),
    }
}
