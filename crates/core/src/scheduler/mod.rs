//! Task scheduler.
//!
//! Runs registered jobs at the right time: startup tasks once at boot,
//! recurring tasks on a drift-forward interval. One run per task at a time,
//! crash isolation between tasks, suspension after repeated failures.

mod config;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use runner::TaskScheduler;
pub use types::{
    task_body, LastResult, SchedulerError, TaskBody, TaskContext, TaskKind, TaskOutcome, TaskRun,
    TaskSnapshot, TaskSpec,
};
