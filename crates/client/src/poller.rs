//! Task poller: follows one backend task until it reaches a terminal status.
//!
//! The session bookkeeping lives in [`PollSession`], a plain struct whose
//! transition methods return the [`PollEffect`]s a fetch produced. The
//! [`TaskPoller`] driver owns the timer, issues fetches through a
//! [`TaskSource`] and hands the effects to a [`TaskObserver`].
//!
//! Every session carries a generation number. Fetches remember the
//! generation they were issued under and their results are dropped if the
//! session was stopped or restarted in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use studio_core::task::{Task, TaskStatus};
use studio_core::types::TaskId;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::ApiError;
use crate::source::TaskSource;

/// Delay between scheduled status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Tunable parameters for a [`TaskPoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Lifecycle callbacks fired by the poller. All methods default to no-ops.
pub trait TaskObserver: Send + Sync {
    /// The task moved from `prev` to `task.status`. Fires once per transition.
    fn on_status_change(&self, _task: &Task, _prev: TaskStatus) {}

    fn on_complete(&self, _task: &Task) {}

    /// The task failed; `task.error_message` carries the backend's reason.
    fn on_failed(&self, _task: &Task) {}

    /// A status read failed. Polling continues.
    fn on_error(&self, _error: &ApiError) {}
}

/// Observer that ignores every callback.
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Paused,
}

/// Callback to fire as the result of applying a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEffect {
    StatusChanged { task: Task, prev: TaskStatus },
    Completed(Task),
    Failed(Task),
}

/// Bookkeeping for one observed task.
#[derive(Debug, Default)]
pub struct PollSession {
    task_id: Option<TaskId>,
    paused: bool,
    prev_status: Option<TaskStatus>,
    snapshot: Option<Task>,
    generation: u64,
    schedule: Option<CancellationToken>,
}

impl PollSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match (&self.task_id, self.paused) {
            (None, _) => SessionState::Idle,
            (Some(_), true) => SessionState::Paused,
            (Some(_), false) => SessionState::Active,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn is_polling(&self) -> bool {
        self.task_id.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn prev_status(&self) -> Option<TaskStatus> {
        self.prev_status
    }

    /// Latest snapshot applied. Kept after teardown so the final state stays visible.
    pub fn snapshot(&self) -> Option<&Task> {
        self.snapshot.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `generation` identifies the session that is currently open.
    pub fn is_current(&self, generation: u64) -> bool {
        self.task_id.is_some() && self.generation == generation
    }

    /// Open a session for `task_id`.
    ///
    /// Returns the new generation, or `None` if a session is already open.
    pub fn begin(&mut self, task_id: TaskId) -> Option<u64> {
        if self.task_id.is_some() {
            return None;
        }
        self.generation += 1;
        self.task_id = Some(task_id);
        self.paused = false;
        self.prev_status = None;
        self.snapshot = None;
        Some(self.generation)
    }

    /// Attach the recurring schedule of `generation`.
    ///
    /// A stale generation or a second schedule is refused and its token is
    /// cancelled on the spot.
    pub fn attach_schedule(&mut self, generation: u64, token: CancellationToken) -> bool {
        if !self.is_current(generation) || self.schedule.is_some() {
            token.cancel();
            return false;
        }
        self.schedule = Some(token);
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state() != SessionState::Active {
            return false;
        }
        self.paused = true;
        true
    }

    /// Clear the pause flag, returning what to fetch right away.
    pub fn resume(&mut self) -> Option<(u64, TaskId)> {
        if self.state() != SessionState::Paused {
            return None;
        }
        self.paused = false;
        self.fetch_target()
    }

    /// Tear the session down and cancel its schedule. Idempotent.
    pub fn end(&mut self) -> bool {
        if self.task_id.is_none() {
            return false;
        }
        self.task_id = None;
        self.paused = false;
        self.generation += 1;
        if let Some(token) = self.schedule.take() {
            token.cancel();
        }
        true
    }

    /// End `generation` if it was opened but never got its schedule.
    ///
    /// Used when a start is abandoned midway, so the session does not stay
    /// open with nothing polling it.
    pub fn abandon(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.schedule.is_some() {
            return false;
        }
        self.end()
    }

    /// What a scheduled tick of `generation` should fetch, if anything.
    pub fn tick_target(&self, generation: u64) -> Option<TaskId> {
        if self.is_current(generation) && !self.paused {
            self.task_id.clone()
        } else {
            None
        }
    }

    /// What an unscheduled fetch should read, regardless of the pause flag.
    pub fn fetch_target(&self) -> Option<(u64, TaskId)> {
        self.task_id.clone().map(|id| (self.generation, id))
    }

    /// Apply a snapshot read under `generation`.
    ///
    /// The first snapshot of a session only records the baseline status.
    /// Terminal statuses end the session.
    pub fn apply_snapshot(&mut self, generation: u64, task: Task) -> Vec<PollEffect> {
        if !self.is_current(generation) {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(prev) = self.prev_status {
            if prev != task.status {
                effects.push(PollEffect::StatusChanged {
                    task: task.clone(),
                    prev,
                });
            }
        }
        self.prev_status = Some(task.status);

        match task.status {
            TaskStatus::Completed => {
                effects.push(PollEffect::Completed(task.clone()));
                self.end();
            }
            TaskStatus::Failed => {
                effects.push(PollEffect::Failed(task.clone()));
                self.end();
            }
            TaskStatus::Cancelled => {
                self.end();
            }
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Paused => {}
        }

        self.snapshot = Some(task);
        effects
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Polls a task on a fixed interval and reports lifecycle changes.
///
/// Dropping the poller tears its session down.
pub struct TaskPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    source: Arc<dyn TaskSource>,
    observer: Arc<dyn TaskObserver>,
    interval: Duration,
    session: Mutex<PollSession>,
}

impl TaskPoller {
    pub fn new(source: Arc<dyn TaskSource>, observer: Arc<dyn TaskObserver>) -> Self {
        Self::with_config(source, observer, PollerConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn TaskSource>,
        observer: Arc<dyn TaskObserver>,
        config: PollerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                source,
                observer,
                interval: config.interval,
                session: Mutex::new(PollSession::new()),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn state(&self) -> SessionState {
        self.inner.session().state()
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.inner.session().task_id().map(str::to_string)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.session().is_polling()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.session().is_paused()
    }

    pub fn prev_status(&self) -> Option<TaskStatus> {
        self.inner.session().prev_status()
    }

    pub fn snapshot(&self) -> Option<Task> {
        self.inner.session().snapshot().cloned()
    }

    /// Start following `task_id`.
    ///
    /// Fetches once right away, then every interval. Returns `false` without
    /// doing anything if a session is already open.
    pub async fn start(&self, task_id: impl Into<TaskId>) -> bool {
        let task_id = task_id.into();
        let begun = self.inner.session().begin(task_id.clone());
        let Some(generation) = begun else {
            tracing::debug!(task_id = %task_id, "Poller already active, start ignored");
            return false;
        };

        tracing::info!(
            task_id = %task_id,
            interval_ms = self.inner.interval.as_millis() as u64,
            "Task polling started",
        );

        // Closes the session again if this future is dropped before the
        // schedule is attached (caller timeout, aborted task, lost select!).
        let guard = StartGuard {
            inner: &self.inner,
            generation,
        };
        self.inner.fetch(generation, &task_id).await;

        let token = CancellationToken::new();
        let attached = self
            .inner
            .session()
            .attach_schedule(generation, token.clone());
        if attached {
            tokio::spawn(run_schedule(Arc::clone(&self.inner), generation, token));
        }
        std::mem::forget(guard);
        true
    }

    /// Skip scheduled ticks until [`resume`](Self::resume). Does not fetch.
    pub fn pause(&self) -> bool {
        let paused = self.inner.session().pause();
        if paused {
            tracing::info!("Task polling paused");
        }
        paused
    }

    /// Clear the pause flag and fetch immediately.
    pub async fn resume(&self) -> bool {
        let target = self.inner.session().resume();
        let Some((generation, task_id)) = target else {
            return false;
        };
        tracing::info!(task_id = %task_id, "Task polling resumed");
        self.inner.fetch(generation, &task_id).await;
        true
    }

    /// Cancel the schedule and return to idle. Safe to call when idle.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.session().end();
        if stopped {
            tracing::info!("Task polling stopped");
        }
        stopped
    }

    /// Fetch once outside the schedule. No-op when idle.
    pub async fn refresh(&self) -> bool {
        let target = self.inner.session().fetch_target();
        let Some((generation, task_id)) = target else {
            return false;
        };
        self.inner.fetch(generation, &task_id).await;
        true
    }

    /// Run a snapshot obtained elsewhere (e.g. a pause response) through
    /// the same transitions as a fetched one.
    pub fn observe(&self, task: Task) -> bool {
        let effects = {
            let mut session = self.inner.session();
            match session.fetch_target() {
                Some((generation, task_id)) if task_id == task.id => {
                    session.apply_snapshot(generation, task)
                }
                _ => return false,
            }
        };
        self.inner.dispatch(effects);
        true
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        self.inner.session().end();
    }
}

impl PollerInner {
    fn session(&self) -> MutexGuard<'_, PollSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the task once and apply the outcome to `generation`.
    async fn fetch(&self, generation: u64, task_id: &str) {
        match self.source.fetch_task(task_id).await {
            Ok(task) => {
                let effects = self.session().apply_snapshot(generation, task);
                self.dispatch(effects);
            }
            Err(err) => {
                let current = self.session().is_current(generation);
                if !current {
                    tracing::debug!(task_id, "Dropping error from a finished poll session");
                    return;
                }
                tracing::warn!(task_id, error = %err, "Task status fetch failed");
                self.observer.on_error(&err);
            }
        }
    }

    fn dispatch(&self, effects: Vec<PollEffect>) {
        for effect in effects {
            match effect {
                PollEffect::StatusChanged { task, prev } => {
                    tracing::debug!(
                        task_id = %task.id,
                        from = %prev,
                        to = %task.status,
                        "Task status changed",
                    );
                    self.observer.on_status_change(&task, prev);
                }
                PollEffect::Completed(task) => {
                    tracing::info!(task_id = %task.id, "Task completed");
                    self.observer.on_complete(&task);
                }
                PollEffect::Failed(task) => {
                    tracing::warn!(
                        task_id = %task.id,
                        error = task.error_message.as_deref().unwrap_or("unknown"),
                        "Task failed",
                    );
                    self.observer.on_failed(&task);
                }
            }
        }
    }
}

struct StartGuard<'a> {
    inner: &'a PollerInner,
    generation: u64,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.inner.session().abandon(self.generation) {
            tracing::debug!(generation = self.generation, "Task polling start abandoned");
        }
    }
}

/// Recurring tick loop of one session generation.
async fn run_schedule(inner: Arc<PollerInner>, generation: u64, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + inner.interval, inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let target = inner.session().tick_target(generation);
        let Some(task_id) = target else {
            // Paused: keep the schedule, skip the fetch.
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = inner.fetch(generation, &task_id) => {}
        }
    }

    tracing::debug!(generation, "Poll schedule stopped");
}
