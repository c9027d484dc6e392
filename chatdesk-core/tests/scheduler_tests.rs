// tests/scheduler_tests.rs
use std::time::Duration as StdDuration;
use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use chatdesk_core::{
    eventbus::DeskEvent,
    models::{ChatStatus, SchedulerConfig},
    tasks::{spawn_assignment_cycle_task, CycleStage},
    Error,
};
use chatdesk_core::test_utils::helpers::*;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        cycle_interval: StdDuration::from_millis(20),
        cycle_timeout: StdDuration::from_secs(5),
        retry_attempts: 2,
        retry_backoff: StdDuration::from_millis(5),
        ..SchedulerConfig::default()
    }
}

#[tokio::test]
async fn test_cycle_runs_every_stage() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let mut events = fx.bus.subscribe(Some(16)).await;
    let desk = &fx.desk;
    seed_global_policy(desk, Duration::minutes(15), Duration::hours(4)).await?;
    add_online_agent(desk, "agent-a", 5).await?;

    let t0 = Utc::now() - Duration::hours(1);
    add_chat_at(desk, t0, None).await?;

    let report = desk.scheduler.run_cycle().await;
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.summary().assigned_count, 1);
    assert_eq!(report.summary().rebalanced_count, 0);
    // Assigned, but nobody answered for an hour.
    assert_eq!(report.breaches_detected, Some(1));

    let mut saw_assignment = false;
    let mut saw_breach = false;
    while let Ok(event) = events.try_recv() {
        match event {
            DeskEvent::ChatsAssigned(result) => saw_assignment = result.assigned_count() == 1,
            DeskEvent::SlaBreach(_) => saw_breach = true,
            _ => {}
        }
    }
    assert!(saw_assignment && saw_breach);
    Ok(())
}

#[tokio::test]
async fn test_failed_stage_does_not_block_the_others() -> Result<(), Error> {
    // No SLA policy configured: the scan stage fails, assignment still lands.
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 5).await?;
    let chat = add_chat_at(desk, Utc::now(), None).await?;

    let report = desk.scheduler.run_cycle().await;
    assert_eq!(report.summary().assigned_count, 1);
    assert!(report.rebalance.is_some());

    let failure = report.failure(CycleStage::SlaScan).expect("sla stage should fail");
    assert!(!failure.transient);
    assert!(!report.has_transient_failure());

    assert_eq!(desk.queue.get(chat.chat_id).await?.status, ChatStatus::Assigned);
    Ok(())
}

#[tokio::test]
async fn test_trigger_assignment_now_reports_counts() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    seed_global_policy(desk, Duration::minutes(15), Duration::hours(4)).await?;
    add_online_agent(desk, "agent-a", 12).await?;
    add_online_agent(desk, "agent-b", 12).await?;
    give_chats(desk, "agent-a", Utc::now() - Duration::minutes(5), 10).await?;
    add_chat_at(desk, Utc::now(), None).await?;

    let summary = desk.scheduler.trigger_assignment_now().await?;
    // The new chat goes to agent-b; then 10 vs 1 around a mean of 5.5 moves three.
    assert_eq!(summary.assigned_count, 1);
    assert_eq!(summary.rebalanced_count, 3);

    let again = desk.scheduler.trigger_assignment_now().await?;
    assert_eq!(again.assigned_count, 0);
    assert_eq!(again.rebalanced_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_trigger_surfaces_store_outage() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    add_online_agent(&fx.desk, "agent-a", 5).await?;
    fx.store.set_offline(true);

    let err = fx.desk.scheduler.trigger_assignment_now().await.unwrap_err();
    assert!(err.is_transient());
    Ok(())
}

#[tokio::test]
async fn test_retry_gives_up_after_configured_attempts() -> Result<(), Error> {
    let fx = memory_desk(fast_config());
    fx.store.set_offline(true);

    let report = fx.desk.scheduler.run_cycle_with_retry().await?;
    assert!(report.has_transient_failure());
    assert_eq!(report.failures.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_retry_recovers_when_store_returns() -> Result<(), Error> {
    let config = SchedulerConfig {
        retry_backoff: StdDuration::from_millis(50),
        ..fast_config()
    };
    let fx = memory_desk(config);
    seed_global_policy(&fx.desk, Duration::minutes(15), Duration::hours(4)).await?;
    add_online_agent(&fx.desk, "agent-a", 5).await?;
    add_chat_at(&fx.desk, Utc::now(), None).await?;
    fx.store.set_offline(true);

    let store = fx.store.clone();
    tokio::spawn(async move {
        sleep(StdDuration::from_millis(20)).await;
        store.set_offline(false);
    });

    let report = fx.desk.scheduler.run_cycle_with_retry().await?;
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.summary().assigned_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_interval_task_assigns_and_stops() -> Result<(), Error> {
    let fx = memory_desk(fast_config());
    seed_global_policy(&fx.desk, Duration::minutes(15), Duration::hours(4)).await?;
    add_online_agent(&fx.desk, "agent-a", 5).await?;
    let chat = add_chat_at(&fx.desk, Utc::now(), None).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_assignment_cycle_task(fx.desk.scheduler.clone(), shutdown_rx)
        .expect("interval is non-zero");

    let queue = fx.desk.queue.clone();
    let assigned = timeout(StdDuration::from_secs(2), async move {
        loop {
            if let Ok(c) = queue.get(chat.chat_id).await {
                if c.status == ChatStatus::Assigned {
                    return;
                }
            }
            sleep(StdDuration::from_millis(10)).await;
        }
    })
    .await;
    assert!(assigned.is_ok(), "chat should be assigned by the interval task");

    shutdown_tx.send(true).expect("task is listening");
    assert!(timeout(StdDuration::from_secs(2), handle).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_zero_interval_disables_task() {
    let config = SchedulerConfig {
        cycle_interval: StdDuration::ZERO,
        ..SchedulerConfig::default()
    };
    let fx = memory_desk(config);
    let (_tx, rx) = watch::channel(false);
    assert!(spawn_assignment_cycle_task(fx.desk.scheduler.clone(), rx).is_none());
}
