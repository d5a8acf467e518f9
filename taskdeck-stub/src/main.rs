//! `taskdeck-stub`: in-memory Taskdeck backend.
//!
//! Serves the task service's routes from memory, with switches for the
//! response shapes and faults real deployments show.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8080
//! cargo run --bin taskdeck-stub
//!
//! # Namespaced statuses, tag arrays, no collaborator listing
//! cargo run --bin taskdeck-stub -- --namespaced-status --tag-array --no-collaborator-listing
//! ```

use std::sync::Arc;

use clap::Parser;
use taskdeck_stub::config::{StubCliArgs, StubConfig};
use taskdeck_stub::server::{self, StubState};

#[tokio::main]
async fn main() {
    let cli = StubCliArgs::parse();

    let config = match StubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, behavior = ?config.behavior, "starting taskdeck stub");

    let state = Arc::new(StubState::new(config.behavior));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "stub server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "stub server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start stub server");
            std::process::exit(1);
        }
    }
}
