//! chatdesk-server/src/server.rs
//!
//! Long-running mode: event logger, interval cycle task and HTTP API, all
//! stopped through the event bus shutdown signal. The one-shot modes run a
//! single pass with the event logger attached.

use std::net::SocketAddr;
use std::time::Duration;
use axum_server::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use chatdesk_core::Error;
use chatdesk_core::eventbus::{spawn_event_logger_task, EventBus};
use chatdesk_core::models::TriggerSummary;
use chatdesk_core::tasks::{spawn_assignment_cycle_task, CycleReport};

use crate::Args;
use crate::context::ServerContext;
use crate::http;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let addr: SocketAddr = args.server_addr.parse()?;
    let ctx = ServerContext::new(&args).await?;
    let event_bus = ctx.event_bus.clone();

    let logger_handle = spawn_event_logger_task(&event_bus).await;
    let cycle_handle = spawn_assignment_cycle_task(ctx.desk.scheduler.clone(), event_bus.shutdown_rx.clone());

    let http_handle = Handle::new();
    let srv_handle = tokio::spawn(http::serve(ctx.desk.clone(), addr, http_handle.clone()));

    // Ctrl-C => signal
    let eb_for_ctrlc = event_bus.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_for_ctrlc.shutdown();
    });

    event_bus.publish_system("chatdesk server started").await;

    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    info!("Stopping HTTP API...");
    http_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    if let Err(e) = srv_handle.await {
        error!("HTTP task ended abnormally: {:?}", e);
    }
    if let Some(handle) = cycle_handle {
        if let Err(e) = handle.await {
            error!("Cycle task ended abnormally: {:?}", e);
        }
    }
    if let Err(e) = logger_handle.await {
        error!("Event logger ended abnormally: {:?}", e);
    }
    if let Some(db) = ctx.db {
        db.pool().close().await;
    }

    info!("Server shut down cleanly.");
    Ok(())
}

/// `--mode cycle`: one cycle (with timeout and retry) for an external cron.
pub async fn run_cycle_once(ctx: &ServerContext) -> Result<CycleReport, Error> {
    let logger_handle = spawn_event_logger_task(&ctx.event_bus).await;
    let outcome = ctx.desk.scheduler.run_cycle_with_retry().await;
    stop_event_logger(&ctx.event_bus, logger_handle).await;
    outcome
}

/// `--mode assign-now`: the operator button from the command line.
pub async fn assign_now_once(ctx: &ServerContext) -> Result<TriggerSummary, Error> {
    let logger_handle = spawn_event_logger_task(&ctx.event_bus).await;
    let outcome = ctx.desk.scheduler.trigger_assignment_now().await;
    stop_event_logger(&ctx.event_bus, logger_handle).await;
    outcome
}

async fn stop_event_logger(event_bus: &EventBus, handle: JoinHandle<()>) {
    event_bus.shutdown();
    if let Err(e) = handle.await {
        error!("Event logger ended abnormally: {:?}", e);
    }
}
