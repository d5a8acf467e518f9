//! `Taskdeck`: terminal client for a task-management REST service.
//!
//! The library holds the synchronization layer: session store, resilient
//! API client, replace-all resource caches and the startup health gate.
//! The `taskdeck` binary is a thin CLI over [`app::App`].

pub mod api;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod health;
pub mod session;
