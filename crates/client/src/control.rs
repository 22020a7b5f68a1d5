//! Pause / resume / cancel / retry layered on the task poller.
//!
//! [`TaskControls`] pairs one [`TaskPoller`] with the server-side commands for
//! the task it follows. [`GenerationWorkflow`] coordinates the two
//! independent generation stages of a project (images and videos), each with
//! its own controls.

use std::sync::Arc;

use studio_core::task::{self, Task, TaskReceipt, TaskStatus};
use studio_core::types::TaskId;

use crate::api::ApiError;
use crate::poller::{PollerConfig, TaskObserver, TaskPoller};
use crate::source::{GenerationKind, TaskCommands, TaskLauncher, TaskSource};

// ---------------------------------------------------------------------------
// Single-task controls
// ---------------------------------------------------------------------------

pub struct TaskControls {
    commands: Arc<dyn TaskCommands>,
    poller: TaskPoller,
}

impl TaskControls {
    pub fn new<B>(backend: Arc<B>, observer: Arc<dyn TaskObserver>, config: PollerConfig) -> Self
    where
        B: TaskSource + TaskCommands + 'static,
    {
        let source: Arc<dyn TaskSource> = backend.clone();
        let commands: Arc<dyn TaskCommands> = backend;
        Self {
            commands,
            poller: TaskPoller::with_config(source, observer, config),
        }
    }

    pub fn poller(&self) -> &TaskPoller {
        &self.poller
    }

    pub fn snapshot(&self) -> Option<Task> {
        self.poller.snapshot()
    }

    /// Start following `task_id`. `false` if a task is already being followed.
    pub async fn watch(&self, task_id: impl Into<TaskId>) -> bool {
        self.poller.start(task_id).await
    }

    /// Pause the task on the server, then suspend scheduled fetches.
    ///
    /// Returns `Ok(false)` without a request when nothing is being followed
    /// or the last known status cannot be paused.
    pub async fn pause(&self) -> Result<bool, ApiError> {
        let Some(task_id) = self.poller.task_id() else {
            return Ok(false);
        };
        if !self.last_status_allows(task::can_pause) {
            tracing::debug!(task_id = %task_id, "Pause skipped, task not pausable");
            return Ok(false);
        }

        let task = self.commands.pause(&task_id).await?;
        self.poller.observe(task);
        self.poller.pause();
        Ok(true)
    }

    /// Resume the task on the server, then resume polling with an immediate fetch.
    pub async fn resume(&self) -> Result<bool, ApiError> {
        let Some(task_id) = self.poller.task_id() else {
            return Ok(false);
        };
        if !self.last_status_allows(task::can_resume) {
            tracing::debug!(task_id = %task_id, "Resume skipped, task not paused");
            return Ok(false);
        }

        let task = self.commands.resume(&task_id).await?;
        self.poller.observe(task);
        if !self.poller.resume().await {
            self.poller.refresh().await;
        }
        Ok(true)
    }

    /// Cancel the task on the server and tear the local session down.
    ///
    /// A 409/400 answer means the task already left a cancellable state; it
    /// is logged and the session is torn down regardless.
    pub async fn cancel(&self) -> Result<bool, ApiError> {
        let Some(task_id) = self.poller.task_id() else {
            return Ok(false);
        };

        match self.commands.cancel(&task_id).await {
            Ok(task) => {
                self.poller.observe(task);
            }
            Err(err) if err.is_transition_rejected() => {
                tracing::warn!(task_id = %task_id, error = %err, "Cancel rejected, task already transitioned");
            }
            Err(err) => return Err(err),
        }

        self.poller.stop();
        Ok(true)
    }

    /// Stop following the task locally. The server task is left alone.
    pub fn stop(&self) -> bool {
        self.poller.stop()
    }

    /// Whether the last snapshot permits an action. With no snapshot yet the
    /// server gets to decide.
    fn last_status_allows(&self, allowed: fn(TaskStatus) -> bool) -> bool {
        self.poller
            .snapshot()
            .map_or(true, |task| allowed(task.status))
    }
}

// ---------------------------------------------------------------------------
// Project workflow
// ---------------------------------------------------------------------------

/// Progress of both stages of a project, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkflowProgress {
    pub images: u8,
    pub videos: u8,
    /// Completed items over total items across both stages.
    pub overall: u8,
}

/// Image and video generation for one project, each followed independently.
pub struct GenerationWorkflow {
    project_id: String,
    launcher: Arc<dyn TaskLauncher>,
    images: TaskControls,
    videos: TaskControls,
}

impl GenerationWorkflow {
    pub fn new<B>(
        project_id: impl Into<String>,
        backend: Arc<B>,
        images_observer: Arc<dyn TaskObserver>,
        videos_observer: Arc<dyn TaskObserver>,
        config: PollerConfig,
    ) -> Self
    where
        B: TaskSource + TaskCommands + TaskLauncher + 'static,
    {
        let launcher: Arc<dyn TaskLauncher> = backend.clone();
        Self {
            project_id: project_id.into(),
            launcher,
            images: TaskControls::new(backend.clone(), images_observer, config.clone()),
            videos: TaskControls::new(backend, videos_observer, config),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn images(&self) -> &TaskControls {
        &self.images
    }

    pub fn videos(&self) -> &TaskControls {
        &self.videos
    }

    /// Submit image generation and follow the new task.
    ///
    /// `Ok(None)` when an image task is already being followed.
    pub async fn start_images(&self) -> Result<Option<TaskReceipt>, ApiError> {
        self.start(GenerationKind::Images, &self.images).await
    }

    pub async fn start_videos(&self) -> Result<Option<TaskReceipt>, ApiError> {
        self.start(GenerationKind::Videos, &self.videos).await
    }

    /// Re-submit image generation after the last image task failed or was cancelled.
    pub async fn retry_images(&self) -> Result<Option<TaskReceipt>, ApiError> {
        self.retry(GenerationKind::Images, &self.images).await
    }

    pub async fn retry_videos(&self) -> Result<Option<TaskReceipt>, ApiError> {
        self.retry(GenerationKind::Videos, &self.videos).await
    }

    pub fn progress(&self) -> WorkflowProgress {
        let images = self.images.snapshot();
        let videos = self.videos.snapshot();

        let (completed, total) = [&images, &videos]
            .into_iter()
            .flatten()
            .fold((0u32, 0u32), |(c, t), task| {
                (c + task.completed_items, t + task.total_items)
            });

        WorkflowProgress {
            images: images.as_ref().map_or(0, Task::progress_percent),
            videos: videos.as_ref().map_or(0, Task::progress_percent),
            overall: task::progress_percent(completed, total),
        }
    }

    /// Stop following both stages.
    pub fn stop_all(&self) {
        self.images.stop();
        self.videos.stop();
    }

    async fn start(
        &self,
        kind: GenerationKind,
        controls: &TaskControls,
    ) -> Result<Option<TaskReceipt>, ApiError> {
        if controls.poller().is_polling() {
            tracing::debug!(project_id = %self.project_id, kind = kind.as_str(), "Stage already running");
            return Ok(None);
        }

        let receipt = self.launcher.launch(&self.project_id, kind).await?;
        tracing::info!(
            project_id = %self.project_id,
            kind = kind.as_str(),
            task_id = %receipt.task_id,
            "Generation task submitted",
        );
        controls.watch(receipt.task_id.clone()).await;
        Ok(Some(receipt))
    }

    async fn retry(
        &self,
        kind: GenerationKind,
        controls: &TaskControls,
    ) -> Result<Option<TaskReceipt>, ApiError> {
        let retryable = controls
            .snapshot()
            .is_some_and(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Cancelled));
        if !retryable || controls.poller().is_polling() {
            return Ok(None);
        }
        self.start(kind, controls).await
    }
}
