//! In-process task store for dev harnesses and tests.
//!
//! Holds task snapshots behind a mutex and applies the same pause / resume /
//! cancel rules as the backend, so the poller and controls can be exercised
//! without a network. Instances are passed around by handle (`Arc`).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use studio_core::error::CoreError;
use studio_core::task::{self, Task, TaskReceipt, TaskStatus, TaskType};
use studio_core::types::TaskId;

use crate::api::ApiError;
use crate::source::{GenerationKind, TaskCommands, TaskLauncher, TaskSource};

/// Work units assigned to an enqueued task when none are given.
pub const DEFAULT_TOTAL_ITEMS: u32 = 15;

pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    default_total_items: u32,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_default_total(DEFAULT_TOTAL_ITEMS)
    }

    pub fn with_default_total(default_total_items: u32) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            default_total_items,
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a snapshot.
    pub fn insert(&self, task: Task) {
        self.tasks().insert(task.id.clone(), task);
    }

    pub fn get(&self, task_id: &str) -> Result<Task, CoreError> {
        self.tasks()
            .get(task_id)
            .cloned()
            .ok_or_else(|| not_found(task_id))
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Create a pending task for `project_id` and return it.
    pub fn enqueue(&self, project_id: &str, task_type: TaskType, total_items: Option<u32>) -> Task {
        let prefix = match task_type {
            TaskType::Image => "gen_images",
            TaskType::Video => "gen_videos",
            TaskType::Download => "download",
            TaskType::Parse => "parse",
            TaskType::Prompt => "gen_prompts",
        };
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{prefix}_{project_id}_{}", &suffix[..8]);

        let now = Utc::now();
        let mut task = Task::pending(id, total_items.unwrap_or(self.default_total_items));
        task.project_id = Some(project_id.to_string());
        task.task_type = Some(task_type);
        task.created_at = Some(now);
        task.updated_at = Some(now);

        tracing::debug!(task_id = %task.id, project_id, "Task enqueued");
        self.insert(task.clone());
        task
    }

    /// Overwrite the status without transition checks.
    pub fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<Task, CoreError> {
        self.update(task_id, |task| {
            task.status = status;
            Ok(())
        })
    }

    /// Record finished work on a live task.
    ///
    /// Moves `pending` to `running`, and to `completed` once every item is
    /// accounted for. Counters are capped at `total_items`.
    pub fn advance(&self, task_id: &str, completed: u32, failed: u32) -> Result<Task, CoreError> {
        self.update(task_id, |task| {
            if task.is_terminal() {
                return Err(CoreError::Conflict(format!(
                    "Task '{}' is already {}",
                    task.id, task.status
                )));
            }
            let total = task.total_items;
            task.completed_items = task.completed_items.saturating_add(completed).min(total);
            task.failed_items = task
                .failed_items
                .saturating_add(failed)
                .min(total - task.completed_items);
            task.progress = task.progress_percent();

            if task.completed_items + task.failed_items >= total {
                task.status = TaskStatus::Completed;
            } else if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Running;
            }
            Ok(())
        })
    }

    /// Fail a live task with `message`.
    pub fn fail(&self, task_id: &str, message: &str) -> Result<Task, CoreError> {
        self.update(task_id, |task| {
            if task.is_terminal() {
                return Err(CoreError::Conflict(format!(
                    "Task '{}' is already {}",
                    task.id, task.status
                )));
            }
            task.status = TaskStatus::Failed;
            task.error_message = Some(message.to_string());
            Ok(())
        })
    }

    fn transition(
        &self,
        task_id: &str,
        action: &str,
        allowed: fn(TaskStatus) -> bool,
        to: TaskStatus,
    ) -> Result<Task, CoreError> {
        self.update(task_id, |task| {
            if !allowed(task.status) {
                return Err(CoreError::Conflict(format!(
                    "Cannot {action} task in status '{}'",
                    task.status
                )));
            }
            task.status = to;
            Ok(())
        })
    }

    fn update<F>(&self, task_id: &str, mutate: F) -> Result<Task, CoreError>
    where
        F: FnOnce(&mut Task) -> Result<(), CoreError>,
    {
        let mut tasks = self.tasks();
        let task = tasks.get_mut(task_id).ok_or_else(|| not_found(task_id))?;
        mutate(task)?;
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }
}

fn not_found(task_id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Task",
        id: task_id.to_string(),
    }
}

#[async_trait]
impl TaskSource for InMemoryTaskStore {
    async fn fetch_task(&self, task_id: &str) -> Result<Task, ApiError> {
        Ok(self.get(task_id)?)
    }
}

#[async_trait]
impl TaskCommands for InMemoryTaskStore {
    async fn pause(&self, task_id: &str) -> Result<Task, ApiError> {
        Ok(self.transition(task_id, "pause", task::can_pause, TaskStatus::Paused)?)
    }

    async fn resume(&self, task_id: &str) -> Result<Task, ApiError> {
        Ok(self.transition(task_id, "resume", task::can_resume, TaskStatus::Running)?)
    }

    async fn cancel(&self, task_id: &str) -> Result<Task, ApiError> {
        Ok(self.transition(task_id, "cancel", task::can_cancel, TaskStatus::Cancelled)?)
    }
}

#[async_trait]
impl TaskLauncher for InMemoryTaskStore {
    async fn launch(&self, project_id: &str, kind: GenerationKind) -> Result<TaskReceipt, ApiError> {
        let task_type = match kind {
            GenerationKind::Images => TaskType::Image,
            GenerationKind::Videos => TaskType::Video,
            GenerationKind::Download => TaskType::Download,
        };
        let task = self.enqueue(project_id, task_type, None);
        Ok(TaskReceipt {
            task_id: task.id,
            status: task.status.to_string(),
            message: format!("Started {}", kind.as_str()),
            total_items: Some(task.total_items),
        })
    }
}
