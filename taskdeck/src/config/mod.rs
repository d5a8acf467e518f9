//! Configuration system for the Taskdeck client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.
//!
//! The API base URL has no default. Resolving an [`ApiConfig`] refuses an
//! unset URL, and refuses a development-only address (localhost, loopback)
//! unless the environment is [`Environment::Development`].

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

use url::{Host, Url};

use crate::cli::Command;

/// Remediation shown whenever the API address is unusable.
pub const REMEDIATION: &str = "API not configured. Set TASKDECK_API_URL (or `base_url` under \
     [api] in ~/.config/taskdeck/config.toml) to the deployed service address.";

/// Errors that can occur when loading configuration.
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

    /// No API base URL was configured anywhere.
    #[error("{}", REMEDIATION)]
    MissingApiUrl,

    /// The configured API base URL is not a usable http(s) URL.
    #[error("invalid API URL {url:?} ({reason}). {}", REMEDIATION)]
    InvalidApiUrl {
        /// The configured value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A development-only address was configured for a production build.
    #[error(
        "API URL {url} points at a development-only address; refusing to use it outside \
         development. {}",
        REMEDIATION
    )]
    DevelopmentUrl {
        /// The configured value.
        url: String,
    },
}

/// Deployment environment the client runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; loopback API addresses are allowed.
    Development,
    /// Deployed use; loopback API addresses are refused.
    Production,
}

impl Environment {
    /// Development for debug builds, production for release builds.
    #[must_use]
    pub const fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }
}

/// HTTP method used for task updates.
///
/// Backends differ: some accept only `PATCH`, some only `PUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
    /// Always `PATCH`.
    Patch,
    /// Always `PUT`.
    Put,
    /// `PATCH` first; when it has no route, switch to `PUT` for the rest
    /// of the process.
    Auto,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    session: SessionFileConfig,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    base_url: Option<String>,
    environment: Option<Environment>,
    request_timeout_secs: Option<u64>,
    health_timeout_secs: Option<u64>,
    update_method: Option<UpdateMethod>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Validated settings for talking to the backend.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: Url,
    /// Ceiling for ordinary requests.
    pub request_timeout: Duration,
    /// Ceiling for the startup health probe.
    pub health_timeout: Duration,
    /// Method used for task updates.
    pub update_method: UpdateMethod,
}

impl ApiConfig {
    /// Validates `raw` as an API base URL for the given environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiUrl`] for unparsable or non-http(s)
    /// URLs and [`ConfigError::DevelopmentUrl`] for loopback hosts outside
    /// development.
    pub fn new(raw: &str, environment: Environment) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        let base_url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidApiUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidApiUrl {
                url: trimmed.to_string(),
                reason: format!("unsupported scheme {:?}", base_url.scheme()),
            });
        }
        if environment == Environment::Production && is_development_host(&base_url) {
            return Err(ConfigError::DevelopmentUrl {
                url: trimmed.to_string(),
            });
        }
        let defaults = ClientConfig::default();
        Ok(Self {
            base_url,
            request_timeout: defaults.request_timeout,
            health_timeout: defaults.health_timeout,
            update_method: defaults.update_method,
        })
    }

    /// Sets the ordinary request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the health probe timeout.
    #[must_use]
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Sets the task update method.
    #[must_use]
    pub fn with_update_method(mut self, method: UpdateMethod) -> Self {
        self.update_method = method;
        self
    }
}

/// Whether the URL's host only makes sense on a developer machine.
#[must_use]
pub fn is_development_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(d)) => {
            let d = d.to_ascii_lowercase();
            d == "localhost" || d.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip == Ipv4Addr::UNSPECIFIED,
        Some(Host::Ipv6(ip)) => ip.is_loopback() || ip == Ipv6Addr::UNSPECIFIED,
        None => true,
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- API --
    /// API base URL, unvalidated.
    pub api_url: Option<String>,
    /// Deployment environment.
    pub environment: Environment,
    /// Ceiling for ordinary requests.
    pub request_timeout: Duration,
    /// Ceiling for the startup health probe.
    pub health_timeout: Duration,
    /// Method used for task updates.
    pub update_method: UpdateMethod,

    // -- Session --
    /// Explicit session file location; `None` means the platform default.
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            environment: Environment::for_build(),
            request_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(30),
            update_method: UpdateMethod::Auto,
            session_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or any config file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli.api_url.clone().or_else(|| file.api.base_url.clone()),
            environment: cli
                .environment
                .or(file.api.environment)
                .unwrap_or(defaults.environment),
            request_timeout: file
                .api
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            health_timeout: file
                .api
                .health_timeout_secs
                .map_or(defaults.health_timeout, Duration::from_secs),
            update_method: cli
                .update_method
                .or(file.api.update_method)
                .unwrap_or(defaults.update_method),
            session_file: cli
                .session_file
                .clone()
                .or_else(|| file.session.path.clone()),
        }
    }

    /// Validate the API settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the base URL is unset, malformed,
    /// or development-only outside development.
    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        let raw = self.api_url.as_deref().ok_or(ConfigError::MissingApiUrl)?;
        Ok(ApiConfig::new(raw, self.environment)?
            .with_request_timeout(self.request_timeout)
            .with_health_timeout(self.health_timeout)
            .with_update_method(self.update_method))
    }

    /// Where the session record lives: the explicit path, or
    /// `<data_dir>/taskdeck/session.json`.
    ///
    /// Returns `None` when no explicit path is set and the platform has
    /// no data directory.
    #[must_use]
    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_file
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("taskdeck").join("session.json")))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(
    name = "taskdeck",
    version,
    about = "Terminal client for the Taskdeck task service",
    arg_required_else_help = true
)]
pub struct CliArgs {
    /// Base URL of the REST API (e.g. `https://api.example.com/api/v1`).
    #[arg(long, env = "TASKDECK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Deployment environment; `production` refuses localhost API URLs.
    #[arg(long, env = "TASKDECK_ENV", value_enum, global = true)]
    pub environment: Option<Environment>,

    /// HTTP method for task updates.
    #[arg(long, value_enum, global = true)]
    pub update_method: Option<UpdateMethod>,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the session file (default: `<data dir>/taskdeck/session.json`).
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_LOG", global = true)]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskdeck.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskdeck").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
