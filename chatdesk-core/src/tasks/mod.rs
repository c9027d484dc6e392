// File: src/tasks/mod.rs

pub mod assignment_cycle;

pub use assignment_cycle::{spawn_assignment_cycle_task, CycleReport, CycleStage, DeskScheduler, StageFailure};
