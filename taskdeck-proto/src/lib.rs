//! Wire types for the Taskdeck REST API.
//!
//! Every response shape the backend has used across its revisions is
//! normalized here into one canonical type, so nothing above this crate
//! ever branches on raw server field variants.

pub mod auth;
pub mod collaborator;
pub mod error;
pub mod ids;
pub mod tag;
pub mod task;
