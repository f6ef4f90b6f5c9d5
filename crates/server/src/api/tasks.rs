//! Task API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use printherd_core::{TaskKind, TaskOutcome, TaskSnapshot};

use crate::state::AppState;

/// Response for a single task
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub kind: TaskKind,
    pub interval_ms: Option<u64>,
    pub last_result: String,
    pub consecutive_failures: u32,
    pub suspended: bool,
    pub next_run_at: Option<String>,
    pub total_runs: u64,
    pub recent_runs: Vec<TaskRunResponse>,
}

#[derive(Debug, Serialize)]
pub struct TaskRunResponse {
    pub started_at: String,
    pub ended_at: String,
    pub outcome: String,
    pub reason: Option<String>,
}

impl From<TaskSnapshot> for TaskResponse {
    fn from(snapshot: TaskSnapshot) -> Self {
        Self {
            id: snapshot.id,
            kind: snapshot.kind,
            interval_ms: snapshot.interval_ms,
            last_result: format!("{:?}", snapshot.last_result).to_lowercase(),
            consecutive_failures: snapshot.consecutive_failures,
            suspended: snapshot.suspended,
            next_run_at: snapshot.next_run_at.map(|t| t.to_rfc3339()),
            total_runs: snapshot.total_runs,
            recent_runs: snapshot
                .recent_runs
                .into_iter()
                .map(|run| {
                    let (outcome, reason) = match run.outcome {
                        TaskOutcome::Success => ("success".to_string(), None),
                        TaskOutcome::Failed { reason } => ("failed".to_string(), Some(reason)),
                    };
                    TaskRunResponse {
                        started_at: run.started_at.to_rfc3339(),
                        ended_at: run.ended_at.to_rfc3339(),
                        outcome,
                        reason,
                    }
                })
                .collect(),
        }
    }
}

/// Response for listing tasks
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskResponse>,
    pub total: usize,
}

/// List all registered tasks with their recent runs
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<ListTasksResponse> {
    let tasks: Vec<TaskResponse> = state
        .scheduler()
        .snapshot_all()
        .into_iter()
        .map(TaskResponse::from)
        .collect();
    let total = tasks.len();
    Json(ListTasksResponse { tasks, total })
}
