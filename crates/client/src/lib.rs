//! Typed client for the Creator Studio gateway.
//!
//! Provides the REST wrapper with normalized errors, the task poller state
//! machine used to follow long-running generation jobs, the pause / resume /
//! cancel / retry control surface built on it, the conflict (HTTP 409)
//! handler, and an in-memory task store for tests and local harnesses.

pub mod api;
pub mod conflict;
pub mod control;
pub mod memory;
pub mod poller;
pub mod source;
