//! Generation task model and derived status helpers.
//!
//! Tasks are owned by the backend: the client only ever reads snapshots of
//! them. The helpers here are pure functions of a snapshot and decide which
//! controls (pause, resume, cancel) make sense for the current status.

use serde::{Deserialize, Serialize};

use crate::types::{TaskId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Server-side lifecycle status of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Wire name of the status, e.g. `"running"`.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a task performs on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Image,
    Video,
    Download,
    Parse,
    Prompt,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of a backend task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Server-reported percentage, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub total_items: u32,
    #[serde(default)]
    pub completed_items: u32,
    #[serde(default)]
    pub failed_items: u32,
    /// Only set when `status` is [`TaskStatus::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl Task {
    /// Build a fresh pending task with `total_items` units of work.
    pub fn pending(id: impl Into<TaskId>, total_items: u32) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            progress: 0,
            total_items,
            completed_items: 0,
            failed_items: 0,
            error_message: None,
            project_id: None,
            task_type: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Progress computed from item counters rather than the server field.
    pub fn progress_percent(&self) -> u8 {
        progress_percent(self.completed_items, self.total_items)
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal(self.status)
    }
}

/// Receipt returned by endpoints that enqueue a long-running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: TaskId,
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u32>,
}

// ---------------------------------------------------------------------------
// Derived helpers
// ---------------------------------------------------------------------------

/// Percentage of completed items, rounded to the nearest integer.
///
/// Returns 0 when `total` is 0 and never exceeds 100.
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(completed) / f64::from(total) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// A terminal task will never change status again.
pub fn is_terminal(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
    )
}

pub fn can_pause(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Running | TaskStatus::Pending)
}

pub fn can_resume(status: TaskStatus) -> bool {
    status == TaskStatus::Paused
}

pub fn can_cancel(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Running | TaskStatus::Pending | TaskStatus::Paused
    )
}
