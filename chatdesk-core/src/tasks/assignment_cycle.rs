// File: src/tasks/assignment_cycle.rs

use std::fmt;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use chatdesk_common::traits::notifier_traits::DeskNotifier;
use crate::Error;
use crate::models::{AssignmentResult, RebalanceResult, SchedulerConfig, TriggerSummary};
use crate::services::{AssignmentEngine, RebalancingEngine, SlaMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Assignment,
    Rebalance,
    SlaScan,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStage::Assignment => write!(f, "assignment"),
            CycleStage::Rebalance => write!(f, "rebalance"),
            CycleStage::SlaScan => write!(f, "sla_scan"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: CycleStage,
    pub message: String,
    pub transient: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub assignment: Option<AssignmentResult>,
    pub rebalance: Option<RebalanceResult>,
    pub breaches_detected: Option<usize>,
    pub failures: Vec<StageFailure>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            assignment: None,
            rebalance: None,
            breaches_detected: None,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// A retry could help: some stage failed on the store, not on config.
    pub fn has_transient_failure(&self) -> bool {
        self.failures.iter().any(|f| f.transient)
    }

    pub fn failure(&self, stage: CycleStage) -> Option<&StageFailure> {
        self.failures.iter().find(|f| f.stage == stage)
    }

    pub fn summary(&self) -> TriggerSummary {
        TriggerSummary {
            assigned_count: self.assignment.as_ref().map_or(0, AssignmentResult::assigned_count),
            rebalanced_count: self.rebalance.as_ref().map_or(0, RebalanceResult::moved_count),
        }
    }

    fn fail(&mut self, stage: CycleStage, e: &Error) {
        error!(%stage, transient = e.is_transient(), "cycle stage failed: {}", e);
        self.failures.push(StageFailure {
            stage,
            message: e.to_string(),
            transient: e.is_transient(),
        });
    }
}

/// Runs assignment, then rebalancing, then the SLA scan. The interval task,
/// the manual trigger and an external cron all go through `run_cycle`.
pub struct DeskScheduler {
    assignment: Arc<AssignmentEngine>,
    rebalancing: Arc<RebalancingEngine>,
    sla: Arc<SlaMonitor>,
    notifier: Arc<dyn DeskNotifier>,
    config: SchedulerConfig,
}

impl DeskScheduler {
    pub fn new(
        assignment: Arc<AssignmentEngine>,
        rebalancing: Arc<RebalancingEngine>,
        sla: Arc<SlaMonitor>,
        notifier: Arc<dyn DeskNotifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            assignment,
            rebalancing,
            sla,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Each stage runs even if an earlier one failed; nothing is rolled back.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::new(now);

        match self.assignment.assign_unassigned_at(now).await {
            Ok(result) => {
                if let Err(e) = self.notifier.notify_assignments(&result).await {
                    warn!("assignment summary not delivered: {}", e);
                }
                report.assignment = Some(result);
            }
            Err(e) => report.fail(CycleStage::Assignment, &e),
        }

        match self.rebalancing.rebalance_at(now).await {
            Ok(result) => {
                if let Err(e) = self.notifier.notify_rebalance(&result).await {
                    warn!("rebalance summary not delivered: {}", e);
                }
                report.rebalance = Some(result);
            }
            Err(e) => report.fail(CycleStage::Rebalance, &e),
        }

        match self.sla.scan_at(now).await {
            Ok(events) => report.breaches_detected = Some(events.len()),
            Err(e) => report.fail(CycleStage::SlaScan, &e),
        }

        let summary = report.summary();
        info!(
            assigned = summary.assigned_count,
            rebalanced = summary.rebalanced_count,
            breaches = report.breaches_detected.unwrap_or(0),
            failures = report.failures.len(),
            "desk cycle finished"
        );
        report
    }

    /// Operator "assign now". Runs a full cycle; fails only if the assignment
    /// stage itself failed.
    pub async fn trigger_assignment_now(&self) -> Result<TriggerSummary, Error> {
        let report = self.run_cycle().await;
        if let Some(failure) = report.failure(CycleStage::Assignment) {
            return Err(if failure.transient {
                Error::TransientStore(failure.message.clone())
            } else {
                Error::InvalidState(failure.message.clone())
            });
        }
        Ok(report.summary())
    }

    /// One cycle under the configured timeout, retried with exponential
    /// backoff while stages fail transiently. A timed-out cycle keeps what it
    /// already committed.
    pub async fn run_cycle_with_retry(&self) -> Result<CycleReport, Error> {
        let mut attempt = 0;
        loop {
            let outcome = time::timeout(self.config.cycle_timeout, self.run_cycle()).await;
            let retry_reason = match outcome {
                Ok(report) if !report.has_transient_failure() => return Ok(report),
                Ok(report) => {
                    if attempt >= self.config.retry_attempts {
                        return Ok(report);
                    }
                    format!("{} stage(s) failed transiently", report.failures.len())
                }
                Err(elapsed) => {
                    if attempt >= self.config.retry_attempts {
                        return Err(Error::Timeout(elapsed));
                    }
                    format!("cycle exceeded {:?}", self.config.cycle_timeout)
                }
            };

            let delay = self.config.backoff_for(attempt);
            warn!(attempt = attempt + 1, ?delay, "retrying desk cycle: {}", retry_reason);
            time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Runs the desk cycle every `cycle_interval` until `shutdown_rx` flips to true.
/// Returns `None` when the interval is zero (cycles come from outside).
pub fn spawn_assignment_cycle_task(
    scheduler: Arc<DeskScheduler>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    let period = scheduler.config().cycle_interval;
    if period.is_zero() {
        info!("built-in desk cycle disabled (interval is zero)");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, "desk cycle task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match scheduler.run_cycle_with_retry().await {
                        Ok(report) if report.is_clean() => debug!("desk cycle ok"),
                        Ok(report) => warn!(failures = report.failures.len(), "desk cycle finished with failures"),
                        Err(e) => error!("desk cycle abandoned: {}", e),
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("desk cycle task shutting down");
                        break;
                    }
                }
            }
        }
    }))
}
