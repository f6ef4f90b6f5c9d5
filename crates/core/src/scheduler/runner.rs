//! Task scheduler implementation.
//!
//! Startup tasks run once, sequentially, in registration order. Recurring
//! tasks each get their own loop that sleeps the interval after every
//! completion (drift-forward, not a wall-clock grid), so a slow run shifts
//! later runs instead of overlapping them. Runs for one task never overlap;
//! runs across tasks share a bounded worker pool.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::hub::{EventHub, Topic};
use crate::metrics;

use super::config::SchedulerConfig;
use super::types::{
    LastResult, SchedulerError, TaskBody, TaskContext, TaskKind, TaskOutcome, TaskRun,
    TaskSnapshot, TaskSpec,
};

/// Mutable scheduling state for one task, guarded by its entry's lock.
struct TaskState {
    last_result: LastResult,
    consecutive_failures: u32,
    suspended: bool,
    next_run_at: Option<chrono::DateTime<Utc>>,
    total_runs: u64,
    recent_runs: VecDeque<TaskRun>,
}

struct TaskEntry {
    id: String,
    kind: TaskKind,
    interval_ms: Option<u64>,
    body: TaskBody,
    state: Mutex<TaskState>,
}

impl TaskEntry {
    fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock().unwrap();
        TaskSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            interval_ms: self.interval_ms,
            last_result: state.last_result,
            consecutive_failures: state.consecutive_failures,
            suspended: state.suspended,
            next_run_at: state.next_run_at,
            total_runs: state.total_runs,
            recent_runs: state.recent_runs.iter().cloned().collect(),
        }
    }
}

/// The task scheduler - runs registered jobs with crash isolation between
/// tasks.
pub struct TaskScheduler {
    config: SchedulerConfig,
    hub: EventHub,

    // Runtime state
    tasks: Mutex<Vec<Arc<TaskEntry>>>,
    started: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    worker_pool: Arc<Semaphore>,
    loop_handles: Mutex<Vec<JoinHandle<()>>>,
    active_runs: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    run_counter: Arc<AtomicU64>,
}

impl TaskScheduler {
    /// Create a new scheduler. Tasks are registered before `start`.
    pub fn new(config: SchedulerConfig, hub: EventHub) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let worker_pool = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));

        Self {
            config,
            hub,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutdown_tx,
            worker_pool,
            loop_handles: Mutex::new(Vec::new()),
            active_runs: Arc::new(Mutex::new(HashMap::new())),
            run_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a task plus its executable body.
    ///
    /// With `quick_boot` enabled, recurring registrations are skipped
    /// entirely - only startup tasks will run.
    pub fn register_task(&self, spec: TaskSpec, body: TaskBody) -> Result<(), SchedulerError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }
        if spec.kind == TaskKind::Recurring {
            match spec.interval_ms {
                Some(interval) if interval > 0 => {}
                _ => return Err(SchedulerError::InvalidInterval(spec.id)),
            }
            if self.config.quick_boot {
                debug!("Quick boot: skipping recurring task {}", spec.id);
                return Ok(());
            }
        }

        let mut tasks = self.tasks.lock().unwrap();
        if tasks.iter().any(|t| t.id == spec.id) {
            return Err(SchedulerError::DuplicateTask(spec.id));
        }

        debug!("Registered {:?} task: {}", spec.kind, spec.id);
        tasks.push(Arc::new(TaskEntry {
            id: spec.id,
            kind: spec.kind,
            interval_ms: spec.interval_ms,
            body,
            state: Mutex::new(TaskState {
                last_result: LastResult::None,
                consecutive_failures: 0,
                suspended: false,
                next_run_at: None,
                total_runs: 0,
                recent_runs: VecDeque::new(),
            }),
        }));
        Ok(())
    }

    /// Start the scheduler: run startup tasks to completion in registration
    /// order, then spawn one loop per recurring task.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let tasks: Vec<Arc<TaskEntry>> = self.tasks.lock().unwrap().clone();
        info!("Starting scheduler with {} tasks", tasks.len());

        for entry in tasks.iter().filter(|t| t.kind == TaskKind::Startup) {
            Self::run_task(
                &self.config,
                &self.hub,
                &self.worker_pool,
                &self.shutdown_tx,
                &self.active_runs,
                &self.run_counter,
                entry,
            )
            .await;
        }

        for entry in tasks.iter().filter(|t| t.kind == TaskKind::Recurring) {
            let handle = self.spawn_recurring_loop(Arc::clone(entry));
            self.loop_handles.lock().unwrap().push(handle);
        }

        info!("Scheduler started");
        Ok(())
    }

    /// Stop accepting new runs, let in-flight runs finish within the grace
    /// timeout, then cancel whatever is left.
    pub async fn shutdown(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.loop_handles.lock().unwrap().drain(..).collect();
        let grace = Duration::from_millis(self.config.grace_timeout_ms);
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("Grace timeout elapsed, cancelling in-flight task runs");
            let active = self.active_runs.lock().unwrap();
            for abort in active.values() {
                abort.abort();
            }
        }

        info!("Scheduler stopped");
    }

    /// Snapshot one task.
    pub fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == task_id)
            .map(|t| t.snapshot())
    }

    /// Snapshot every registered task, in registration order.
    pub fn snapshot_all(&self) -> Vec<TaskSnapshot> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.snapshot())
            .collect()
    }

    /// Spawn the drift-forward loop for one recurring task.
    fn spawn_recurring_loop(&self, entry: Arc<TaskEntry>) -> JoinHandle<()> {
        let config = self.config.clone();
        let hub = self.hub.clone();
        let worker_pool = Arc::clone(&self.worker_pool);
        let shutdown_tx = self.shutdown_tx.clone();
        let active_runs = Arc::clone(&self.active_runs);
        let run_counter = Arc::clone(&self.run_counter);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // interval_ms validated at registration
        let interval = Duration::from_millis(entry.interval_ms.unwrap_or(1));

        tokio::spawn(async move {
            debug!("Recurring loop started for task {}", entry.id);
            loop {
                {
                    let mut state = entry.state.lock().unwrap();
                    if state.suspended {
                        break;
                    }
                    state.next_run_at =
                        Some(Utc::now() + chrono::Duration::from_std(interval).unwrap_or_default());
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Recurring loop for {} received shutdown signal", entry.id);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        Self::run_task(
                            &config,
                            &hub,
                            &worker_pool,
                            &shutdown_tx,
                            &active_runs,
                            &run_counter,
                            &entry,
                        )
                        .await;
                    }
                }
            }
            entry.state.lock().unwrap().next_run_at = None;
            debug!("Recurring loop stopped for task {}", entry.id);
        })
    }

    /// Execute one run of a task and record its outcome.
    ///
    /// The body runs in its own spawned task so a panic is contained there;
    /// it is caught here and recorded as a failed run.
    async fn run_task(
        config: &SchedulerConfig,
        hub: &EventHub,
        worker_pool: &Arc<Semaphore>,
        shutdown_tx: &broadcast::Sender<()>,
        active_runs: &Arc<Mutex<HashMap<u64, AbortHandle>>>,
        run_counter: &AtomicU64,
        entry: &Arc<TaskEntry>,
    ) {
        if entry.state.lock().unwrap().suspended {
            return;
        }

        let Ok(_permit) = Arc::clone(worker_pool).acquire_owned().await else {
            return;
        };

        let started_at = Utc::now();
        let ctx = TaskContext::new(shutdown_tx.subscribe());
        let handle = tokio::spawn((entry.body)(ctx));

        let run_id = run_counter.fetch_add(1, Ordering::Relaxed);
        active_runs
            .lock()
            .unwrap()
            .insert(run_id, handle.abort_handle());
        let joined = handle.await;
        active_runs.lock().unwrap().remove(&run_id);

        let outcome = match joined {
            Ok(Ok(())) => TaskOutcome::Success,
            Ok(Err(e)) => TaskOutcome::Failed {
                reason: e.to_string(),
            },
            Err(e) if e.is_panic() => TaskOutcome::Failed {
                reason: format!("Task body panicked: {:?}", e),
            },
            Err(_) => TaskOutcome::Failed {
                reason: "Task run cancelled".to_string(),
            },
        };

        let run = TaskRun {
            task_id: entry.id.clone(),
            started_at,
            ended_at: Utc::now(),
            outcome: outcome.clone(),
        };

        let newly_suspended = {
            let mut state = entry.state.lock().unwrap();
            state.total_runs += 1;
            state.recent_runs.push_back(run);
            while state.recent_runs.len() > config.recent_runs_retained {
                state.recent_runs.pop_front();
            }

            match &outcome {
                TaskOutcome::Success => {
                    state.last_result = LastResult::Success;
                    state.consecutive_failures = 0;
                    false
                }
                TaskOutcome::Failed { .. } => {
                    state.last_result = LastResult::Failed;
                    state.consecutive_failures += 1;
                    if state.consecutive_failures >= config.failure_ceiling && !state.suspended {
                        state.suspended = true;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        match &outcome {
            TaskOutcome::Success => {
                metrics::TASK_RUNS.with_label_values(&["success"]).inc();
                debug!("Task {} run succeeded", entry.id);
            }
            TaskOutcome::Failed { reason } => {
                metrics::TASK_RUNS.with_label_values(&["failed"]).inc();
                warn!("Task {} run failed: {}", entry.id, reason);
            }
        }

        if newly_suspended {
            metrics::TASKS_SUSPENDED.inc();
            let failures = entry.state.lock().unwrap().consecutive_failures;
            warn!(
                "Task {} suspended after {} consecutive failures",
                entry.id, failures
            );
            hub.publish(
                Topic::Monitoring,
                json!({
                    "alert": "task_suspended",
                    "task_id": entry.id,
                    "consecutive_failures": failures,
                }),
            );
        }
    }
}
