//! Types for the task scheduler.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors returned by scheduler registration.
///
/// Only caller misuse surfaces here; failures inside task bodies are
/// recorded on the task, never propagated.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Invalid interval for recurring task {0}: must be > 0")]
    InvalidInterval(String),

    #[error("Scheduler already started")]
    AlreadyStarted,
}

/// How a task is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Runs once, immediately on start, in registration order, before any
    /// recurring task.
    Startup,
    /// Runs every interval, drifting forward from completion time.
    Recurring,
}

/// Result of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastResult {
    None,
    Success,
    Failed,
}

/// Outcome of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failed { reason: String },
}

/// One execution attempt. Immutable once finished; the most recent N per
/// task are retained for diagnostics, not as a durable audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: TaskOutcome,
}

/// Immutable view of one task's scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    pub last_result: LastResult,
    pub consecutive_failures: u32,
    pub suspended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub recent_runs: Vec<TaskRun>,
}

/// Declarative description of a task, paired with a body at registration.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: String,
    pub kind: TaskKind,
    pub interval_ms: Option<u64>,
}

impl TaskSpec {
    /// A task that runs once at startup.
    pub fn startup(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TaskKind::Startup,
            interval_ms: None,
        }
    }

    /// A task that runs every `interval_ms` milliseconds.
    pub fn recurring(id: impl Into<String>, interval_ms: u64) -> Self {
        Self {
            id: id.into(),
            kind: TaskKind::Recurring,
            interval_ms: Some(interval_ms),
        }
    }
}

/// Handed to every task run; lets long-running bodies observe shutdown at
/// their next suspension point.
pub struct TaskContext {
    shutdown_rx: broadcast::Receiver<()>,
}

impl TaskContext {
    pub(crate) fn new(shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self { shutdown_rx }
    }

    /// Resolves when scheduler shutdown has been signalled.
    pub async fn shutdown_signalled(&mut self) {
        let _ = self.shutdown_rx.recv().await;
    }

    /// Non-blocking check for a pending shutdown signal.
    pub fn is_shutting_down(&mut self) -> bool {
        !matches!(
            self.shutdown_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }
}

/// Executable body of a task. Invoked once per run with a fresh context.
pub type TaskBody = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`TaskBody`].
pub fn task_body<F, Fut>(f: F) -> TaskBody
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}
