//! Seams between the task machinery and whatever backs it.
//!
//! [`StudioApi`](crate::api::StudioApi) implements these over HTTP and
//! [`InMemoryTaskStore`](crate::memory::InMemoryTaskStore) implements them
//! in process, so the poller and controls run unchanged against either.

use async_trait::async_trait;
use studio_core::task::{Task, TaskReceipt};

use crate::api::ApiError;

/// Reads task snapshots.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_task(&self, task_id: &str) -> Result<Task, ApiError>;
}

/// Server-side task controls. Each returns the snapshot after the change.
#[async_trait]
pub trait TaskCommands: Send + Sync {
    async fn pause(&self, task_id: &str) -> Result<Task, ApiError>;
    async fn resume(&self, task_id: &str) -> Result<Task, ApiError>;
    async fn cancel(&self, task_id: &str) -> Result<Task, ApiError>;
}

/// Kinds of long-running work a project can enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Images,
    Videos,
    Download,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationKind::Images => "images",
            GenerationKind::Videos => "videos",
            GenerationKind::Download => "download",
        }
    }
}

/// Enqueues generation work and returns the receipt of the new task.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    async fn launch(&self, project_id: &str, kind: GenerationKind) -> Result<TaskReceipt, ApiError>;
}
