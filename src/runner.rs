//! Scheduler core: due-queue, tick loop, and dispatch.
//!
//! One tokio task drives the tick loop. Each tick collects every due record
//! in `(execution_time, id)` order and spawns its execution on a
//! [`TaskTracker`], so a slow handler never blocks the loop or other due
//! tasks. The queue and in-flight set are the only shared mutable state and
//! live behind a single async mutex; handlers never touch them directly —
//! they get a [`SchedulerHandle`] and go through it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::handler::{TaskPayload, encode_payload};
use crate::registry::HandlerRegistry;
use crate::store::{NewTask, TaskStore};
use crate::task::{SchedulerSnapshot, TaskId, TaskRecord, TaskRunOutcome, TaskRunRecord};

/// First id in the runtime-only range.
///
/// Store rowids grow from 1 and never reach this, so the two id spaces stay
/// disjoint. Runtime ids are also handed out when a durable save fails and
/// the record continues in memory only.
const RUNTIME_ID_BASE: i64 = 1 << 32;

/// Queue, in-flight set, and run history. All mutation happens under the
/// scheduler's state mutex.
struct QueueState {
    /// Records waiting to become due, keyed by id. Dispatch removes a
    /// record from here, so this is exactly the set of non-executing,
    /// non-removed records known to the process.
    pending: HashMap<TaskId, TaskRecord>,
    /// Ids currently executing. Guards against re-dispatch of a task that
    /// is still running.
    in_flight: HashSet<TaskId>,
    /// Bounded ring of recent runs, oldest first.
    history: VecDeque<TaskRunRecord>,
}

impl QueueState {
    fn push_history(&mut self, limit: usize, run: TaskRunRecord) {
        self.history.push_back(run);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

/// Shared core behind both [`Scheduler`] and every [`SchedulerHandle`].
struct SchedulerCore {
    registry: HandlerRegistry,
    store: Arc<dyn TaskStore>,
    config: SchedulerConfig,
    state: Mutex<QueueState>,
    next_runtime_id: AtomicI64,
}

impl SchedulerCore {
    fn allocate_runtime_id(&self) -> TaskId {
        TaskId::new(self.next_runtime_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Cloneable scheduling capability.
///
/// Handed to every component that needs to schedule or cancel work,
/// including handlers at their entry points. This is the dependency
/// injection seam: there is no process-wide scheduler global.
#[derive(Clone)]
pub struct SchedulerHandle {
    core: Arc<SchedulerCore>,
}

impl SchedulerHandle {
    /// Schedule a typed payload for execution at `at`, using the handler's
    /// default persistence mode.
    ///
    /// `at` may be in the past; the task becomes due on the next tick.
    /// Fails with [`Error::HandlerNotFound`](crate::Error::HandlerNotFound)
    /// if no handler is registered for the payload's type.
    pub async fn schedule<P: TaskPayload>(
        &self,
        at: DateTime<Utc>,
        payload: &P,
    ) -> Result<TaskId> {
        let handler = self.core.registry.lookup(P::TASK_TYPE)?;
        let runtime_only = handler.runtime_only();
        self.schedule_with(at, payload, runtime_only).await
    }

    /// Schedule with an explicit persistence mode, overriding the handler's
    /// default.
    pub async fn schedule_with<P: TaskPayload>(
        &self,
        at: DateTime<Utc>,
        payload: &P,
        runtime_only: bool,
    ) -> Result<TaskId> {
        let handler = self.core.registry.lookup(P::TASK_TYPE)?;
        let value = encode_payload(payload)?;
        let description = handler.describe_value(&value, at);
        self.insert_record(at, P::TASK_TYPE.to_owned(), value, description, runtime_only)
            .await
    }

    async fn insert_record(
        &self,
        at: DateTime<Utc>,
        task_type: String,
        payload: serde_json::Value,
        description: String,
        runtime_only: bool,
    ) -> Result<TaskId> {
        let id = if runtime_only {
            self.core.allocate_runtime_id()
        } else {
            let new_task = NewTask {
                execution_time: at,
                task_type: task_type.clone(),
                description: description.clone(),
                payload: payload.clone(),
            };
            match self.core.store.save(&new_task) {
                Ok(id) => id,
                Err(e) => {
                    // Queue state stays authoritative; the task just won't
                    // survive a crash until the store recovers.
                    warn!(
                        task_type,
                        "cannot persist task, continuing in memory: {e}"
                    );
                    self.core.allocate_runtime_id()
                }
            }
        };

        let record = TaskRecord {
            id,
            execution_time: at,
            task_type,
            payload,
            description,
            runtime_only,
        };

        let mut state = self.core.state.lock().await;
        debug!(task_id = %id, task_type = record.task_type, "task scheduled for {at}");
        state.pending.insert(id, record);
        Ok(id)
    }

    /// Cancel a single queued task. No-op if the id is unknown or the task
    /// already dispatched; a task that is mid-execution runs to completion.
    pub async fn cancel(&self, id: TaskId) {
        let removed = {
            let mut state = self.core.state.lock().await;
            state.pending.remove(&id)
        };

        let Some(record) = removed else {
            debug!(task_id = %id, "cancel: id not queued, nothing to do");
            return;
        };

        if !record.runtime_only
            && let Err(e) = self.core.store.delete(id)
        {
            warn!(task_id = %id, "cancel: cannot delete persisted row: {e}");
        }
        debug!(task_id = %id, task_type = record.task_type, "task cancelled");
    }

    /// Cancel every pending task of the given type, in queue and store.
    /// Idempotent. Records already dispatched are unaffected.
    ///
    /// This is the coalescing primitive: reschedule a periodic refresh by
    /// cancelling the type wholesale, then scheduling the next instance.
    pub async fn cancel_all(&self, task_type: &str) {
        let removed = {
            let mut state = self.core.state.lock().await;
            let ids: Vec<TaskId> = state
                .pending
                .values()
                .filter(|r| r.task_type == task_type)
                .map(|r| r.id)
                .collect();
            for id in &ids {
                state.pending.remove(id);
            }
            ids.len()
        };

        if let Err(e) = self.core.store.delete_all_of_type(task_type) {
            warn!(task_type, "cancel_all: cannot clear persisted rows: {e}");
        }
        debug!(task_type, "cancelled {removed} pending task(s)");
    }

    /// Re-point a queued task at now so the next tick picks it up.
    /// Returns whether the id was found in the queue.
    pub async fn mark_due_now(&self, id: TaskId) -> bool {
        let mut state = self.core.state.lock().await;
        match state.pending.get_mut(&id) {
            Some(record) => {
                record.execution_time = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Point-in-time view of pending tasks and recent run history.
    pub async fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.core.state.lock().await;
        let mut pending: Vec<TaskRecord> = state.pending.values().cloned().collect();
        pending.sort_by_key(|r| (r.execution_time, r.id));
        SchedulerSnapshot {
            pending,
            history: state.history.iter().cloned().collect(),
        }
    }
}

/// Background scheduler for durable delayed tasks.
///
/// Construction order at startup: build the [`HandlerRegistry`], create the
/// scheduler, call [`Scheduler::load_persisted`], then [`Scheduler::start`].
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    tick_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler over the given registry and store.
    pub fn new(
        registry: HandlerRegistry,
        store: Arc<dyn TaskStore>,
        config: SchedulerConfig,
    ) -> Self {
        info!(
            "scheduler created with {} handler(s): {:?}",
            registry.len(),
            registry.registered_types()
        );
        Self {
            core: Arc::new(SchedulerCore {
                registry,
                store,
                config,
                state: Mutex::new(QueueState {
                    pending: HashMap::new(),
                    in_flight: HashSet::new(),
                    history: VecDeque::new(),
                }),
                next_runtime_id: AtomicI64::new(RUNTIME_ID_BASE),
            }),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            tick_task: std::sync::Mutex::new(None),
        }
    }

    /// A cloneable handle for scheduling and cancellation.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Load all persisted tasks into the queue. Call once at startup,
    /// before [`Scheduler::start`].
    ///
    /// A store failure here is fatal: the scheduler cannot safely start
    /// with an unknown task set. Runtime-only tasks from the previous
    /// process are gone by definition; that is accepted data loss.
    pub async fn load_persisted(&self) -> Result<usize> {
        let records = self.core.store.list_all()?;
        let count = records.len();

        let mut state = self.core.state.lock().await;
        for record in records {
            state.pending.insert(record.id, record);
        }
        info!("loaded {count} persisted task(s)");
        Ok(count)
    }

    /// Start the tick loop. Does nothing if already started.
    pub fn start(&self) {
        let mut slot = self.tick_task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("scheduler already started");
            return;
        }

        let core = Arc::clone(&self.core);
        let tracker = self.tracker.clone();
        let shutdown = self.shutdown.clone();
        let tick_interval = Duration::from_secs(core.config.tick_interval_secs.max(1));

        *slot = Some(tokio::spawn(async move {
            info!("scheduler started, tick interval {tick_interval:?}");
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => run_tick(&core, &tracker).await,
                }
            }
            debug!("scheduler tick loop exited");
        }));
    }

    /// Stop the tick loop and wait for in-flight executions to finish.
    ///
    /// Graceful only: running handlers are never interrupted. Pending
    /// not-yet-due tasks stay persisted for the next process.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = {
            let mut slot = self.tick_task.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("scheduler stopped");
    }
}

/// One scan-and-dispatch pass.
///
/// Collects due records in `(execution_time, id)` order, then launches each
/// one on the tracker. The pass itself never awaits handler completion, so
/// ticks cannot overlap and a stuck handler cannot stall the loop.
async fn run_tick(core: &Arc<SchedulerCore>, tracker: &TaskTracker) {
    let now = Utc::now();

    // Records whose type lost its handler: removed here, rows deleted below.
    let mut dropped: Vec<TaskRecord> = Vec::new();

    {
        let mut state = core.state.lock().await;
        let mut due: Vec<TaskId> = state
            .pending
            .values()
            .filter(|r| r.is_due(now) && !state.in_flight.contains(&r.id))
            .map(|r| r.id)
            .collect();
        if due.is_empty() {
            return;
        }
        due.sort_by_key(|id| {
            let record = &state.pending[id];
            (record.execution_time, record.id)
        });
        debug!("tick: {} task(s) due", due.len());

        for id in due {
            let Some(record) = state.pending.remove(&id) else {
                continue;
            };

            let handler = match core.registry.lookup(&record.task_type) {
                Ok(handler) => handler,
                Err(e) => {
                    // Unrecoverable without a code deploy; drop, never retry.
                    error!(
                        task_id = %record.id,
                        task_type = record.task_type,
                        "dropping task: {e}"
                    );
                    state.push_history(
                        core.config.history_limit,
                        TaskRunRecord {
                            task_id: record.id,
                            task_type: record.task_type.clone(),
                            started_at: now,
                            finished_at: now,
                            outcome: TaskRunOutcome::Dropped,
                            summary: e.to_string(),
                        },
                    );
                    dropped.push(record);
                    continue;
                }
            };

            state.in_flight.insert(record.id);
            let core = Arc::clone(core);
            tracker.spawn(async move {
                execute_record(core, record, handler).await;
            });
        }
    }

    for record in dropped {
        if !record.runtime_only
            && let Err(e) = core.store.delete(record.id)
        {
            warn!(task_id = %record.id, "cannot delete dropped task row: {e}");
        }
    }
}

/// Run one dispatched record inside its failure boundary.
async fn execute_record(
    core: Arc<SchedulerCore>,
    record: TaskRecord,
    handler: Arc<dyn crate::handler::ErasedHandler>,
) {
    let scheduler = SchedulerHandle {
        core: Arc::clone(&core),
    };
    let started_at = Utc::now();
    debug!(task_id = %record.id, task_type = record.task_type, "executing task");

    let result = handler
        .execute_value(record.payload.clone(), &scheduler)
        .await;
    let finished_at = Utc::now();

    // Tear the record down everywhere before the failure hook runs, so a
    // reschedule from `on_failure` creates a genuinely new record instead
    // of colliding with this one.
    let (outcome, summary) = match &result {
        Ok(()) => (TaskRunOutcome::Completed, record.description.clone()),
        Err(e) => (TaskRunOutcome::Failed, e.to_string()),
    };
    {
        let mut state = core.state.lock().await;
        state.in_flight.remove(&record.id);
        state.push_history(
            core.config.history_limit,
            TaskRunRecord {
                task_id: record.id,
                task_type: record.task_type.clone(),
                started_at,
                finished_at,
                outcome,
                summary,
            },
        );
    }
    if !record.runtime_only
        && let Err(e) = core.store.delete(record.id)
    {
        warn!(task_id = %record.id, "cannot delete completed task row: {e}");
    }

    match result {
        Ok(()) => {
            debug!(task_id = %record.id, task_type = record.task_type, "task completed");
        }
        Err(err) => {
            error!(
                task_id = %record.id,
                task_type = record.task_type,
                "task failed: {err}"
            );
            handler
                .on_failure_value(&err, record.payload, &scheduler)
                .await;
        }
    }
}
