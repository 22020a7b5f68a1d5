//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use studio_client::api::ApiError;
use studio_client::poller::{TaskObserver, DEFAULT_POLL_INTERVAL};
use studio_core::task::{Task, TaskStatus};

/// One recorded observer callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Changed { from: TaskStatus, to: TaskStatus },
    Completed(String),
    Failed(Option<String>),
    Error,
}

/// Observer that records every callback in order.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Completed(_)))
            .count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl TaskObserver for Recorder {
    fn on_status_change(&self, task: &Task, prev: TaskStatus) {
        self.push(Event::Changed {
            from: prev,
            to: task.status,
        });
    }

    fn on_complete(&self, task: &Task) {
        self.push(Event::Completed(task.id.clone()));
    }

    fn on_failed(&self, task: &Task) {
        self.push(Event::Failed(task.error_message.clone()));
    }

    fn on_error(&self, _error: &ApiError) {
        self.push(Event::Error);
    }
}

/// Sleep just past the next scheduled poll (paused clock).
pub async fn next_tick() {
    tokio::time::sleep(DEFAULT_POLL_INTERVAL + Duration::from_millis(1)).await;
}
