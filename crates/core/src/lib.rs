//! Domain types and pure policy for the Creator Studio gateway.
//!
//! Nothing in this crate performs I/O. The task model and its derived
//! helpers are shared by the client crate, while the route-timeout policy
//! and media URL resolution are consumed by the HTTP gateway.

pub mod error;
pub mod media;
pub mod route_policy;
pub mod task;
pub mod types;
