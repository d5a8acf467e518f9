//! In-memory Taskdeck backend used for local runs and integration tests.

pub mod config;
pub mod server;
pub mod store;
