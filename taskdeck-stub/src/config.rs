//! Configuration for the stub backend.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck-stub/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

use crate::server::{Behavior, Outage, StatusStyle, TagStyle, UpdateMethods};

/// Errors that can occur when loading stub configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StubConfigFile {
    server: ServerFileConfig,
    behavior: BehaviorFileConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BehaviorFileConfig {
    namespaced_status: Option<bool>,
    tag_array: Option<bool>,
    wrap_collections: Option<bool>,
    no_collaborator_listing: Option<bool>,
    no_collaborator_removal: Option<bool>,
    tags_delay_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the stub server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "In-memory Taskdeck backend for local testing")]
pub struct StubCliArgs {
    /// Address to bind to.
    #[arg(short, long, env = "TASKDECK_STUB_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskdeck-stub/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write statuses as `TaskStatus.X`.
    #[arg(long)]
    pub namespaced_status: bool,

    /// Write tags as `tags: [{id, name}]` instead of `tagId`.
    #[arg(long)]
    pub tag_array: bool,

    /// Wrap list responses in an object.
    #[arg(long)]
    pub wrap_collections: bool,

    /// Methods accepted for task updates.
    #[arg(long, value_enum)]
    pub update_methods: Option<UpdateMethods>,

    /// Answer collaborator listing with 404.
    #[arg(long)]
    pub no_collaborator_listing: bool,

    /// Answer collaborator removal with 404.
    #[arg(long)]
    pub no_collaborator_removal: bool,

    /// Delay `GET /tags` by this many milliseconds.
    #[arg(long)]
    pub tags_delay_ms: Option<u64>,

    /// Serve an "Application Error" page for every request.
    #[arg(long)]
    pub outage: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_STUB_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved stub configuration.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Address to bind the server to.
    pub bind_addr: String,
    /// Response shapes and faults.
    pub behavior: Behavior,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            behavior: Behavior::full(),
            log_level: "info".to_string(),
        }
    }
}

impl StubConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &StubCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default. Boolean flags only ever switch a
    /// quirk on.
    fn resolve(cli: &StubCliArgs, file: &StubConfigFile) -> Self {
        let defaults = Self::default();
        let quirks = &file.behavior;
        let on = |flag: bool, from_file: Option<bool>| flag || from_file.unwrap_or(false);

        let behavior = Behavior {
            status_style: if on(cli.namespaced_status, quirks.namespaced_status) {
                StatusStyle::Namespaced
            } else {
                StatusStyle::Bare
            },
            tag_style: if on(cli.tag_array, quirks.tag_array) {
                TagStyle::Array
            } else {
                TagStyle::Single
            },
            wrap_collections: on(cli.wrap_collections, quirks.wrap_collections),
            update_methods: cli.update_methods.unwrap_or_default(),
            collaborator_listing: !on(cli.no_collaborator_listing, quirks.no_collaborator_listing),
            collaborator_removal: !on(cli.no_collaborator_removal, quirks.no_collaborator_removal),
            omit_token: false,
            tags_delay: cli
                .tags_delay_ms
                .or(quirks.tags_delay_ms)
                .map(Duration::from_millis),
            outage: cli.outage.then(Outage::application_error),
        };

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            behavior,
            log_level: cli.log_level.clone(),
        }
    }
}

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<StubConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(StubConfigFile::default());
        };
        config_dir.join("taskdeck-stub").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StubConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
