//! Server configuration module.
//!
//! Parses configuration from environment variables for the todolist server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TODOLIST_GITHUB_OWNER` | Yes | - | Owner of the task repository |
//! | `TODOLIST_GITHUB_REPO` | Yes | - | Name of the task repository |
//! | `TODOLIST_GITHUB_TOKEN` | Yes* | - | GitHub token with contents access |
//! | `TODOLIST_GITHUB_BRANCH` | No | `main` | Branch holding the task files |
//! | `TODOLIST_GITHUB_API_URL` | No | `https://api.github.com` | API base URL |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `TODOLIST_API_TOKEN` | No | - | Bearer token for the HTTP API; unset disables auth |
//! | `TODOLIST_DATA_DIR` | No | `~/.todolist` | Local data directory |
//! | `TODOLIST_SOUND_PATH` | No | `<data_dir>/bell.wav` | Reminder sound file |
//! | `TODOLIST_NOTIFIER` | No | `desktop` | `desktop` or `log` |
//! | `TODOLIST_REMINDER_POLL_MS` | No | 250 | Reminder loop poll interval |
//! | `TODOLIST_SHUTDOWN_TIMEOUT_SECS` | No | 2 | Reminder loop shutdown timeout |
//!
//! *`GITHUB_TOKEN` is accepted when `TODOLIST_GITHUB_TOKEN` is unset.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default branch holding task files.
const DEFAULT_BRANCH: &str = "main";

/// Default GitHub REST endpoint.
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default data directory name relative to home.
const DEFAULT_DATA_DIR: &str = ".todolist";

/// Default sound file name inside the data directory.
const DEFAULT_SOUND_FILE: &str = "bell.wav";

/// Default reminder poll interval in milliseconds.
const DEFAULT_POLL_MS: u64 = 250;

/// Default reminder shutdown timeout in seconds.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 2;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Which delivery sink the reminder service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifierKind {
    /// Desktop popup and sound, falling back to nothing when unavailable.
    #[default]
    Desktop,
    /// Structured log records only.
    Log,
}

impl FromStr for NotifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "log" => Ok(Self::Log),
            other => Err(format!("expected 'desktop' or 'log', got '{other}'")),
        }
    }
}

/// Coordinates of the repository that stores the tasks.
#[derive(Clone)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub branch: String,
    pub api_url: String,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"[REDACTED]")
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Task repository coordinates and credentials.
    pub github: GitHubConfig,

    /// HTTP server port.
    pub port: u16,

    /// Bearer token required on API requests; `None` disables auth.
    pub api_token: Option<String>,

    /// Local data directory.
    pub data_dir: PathBuf,

    /// Sound played with each reminder.
    pub sound_path: PathBuf,

    /// Delivery sink for reminders.
    pub notifier: NotifierKind,

    /// Reminder loop poll interval.
    pub reminder_poll_interval: Duration,

    /// How long shutdown waits for the reminder loop.
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The repository owner, name, or token is missing
    /// - A numeric or enumerated variable has an invalid value
    /// - No data directory is given and the home directory is unknown
    ///
    /// # Example
    ///
    /// ```no_run
    /// use todolist_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let owner = required("TODOLIST_GITHUB_OWNER")?;
        let repo = required("TODOLIST_GITHUB_REPO")?;
        let token = optional("TODOLIST_GITHUB_TOKEN")
            .or_else(|| optional("GITHUB_TOKEN"))
            .ok_or_else(|| ConfigError::MissingEnvVar("TODOLIST_GITHUB_TOKEN".to_string()))?;
        let branch = optional("TODOLIST_GITHUB_BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.into());
        let api_url = optional("TODOLIST_GITHUB_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.into())
            .trim_end_matches('/')
            .to_string();

        let port = parse_number("PORT", DEFAULT_PORT)?;
        let api_token = optional("TODOLIST_API_TOKEN");

        let data_dir = match optional("TODOLIST_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => BaseDirs::new()
                .ok_or(ConfigError::NoHomeDirectory)?
                .home_dir()
                .join(DEFAULT_DATA_DIR),
        };
        let sound_path = optional("TODOLIST_SOUND_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_SOUND_FILE));

        let notifier = match optional("TODOLIST_NOTIFIER") {
            Some(value) => value
                .parse::<NotifierKind>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "TODOLIST_NOTIFIER".to_string(),
                    message,
                })?,
            None => NotifierKind::default(),
        };

        let poll_ms = parse_number("TODOLIST_REMINDER_POLL_MS", DEFAULT_POLL_MS)?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TODOLIST_REMINDER_POLL_MS".to_string(),
                message: "poll interval must be greater than 0".to_string(),
            });
        }
        let shutdown_secs =
            parse_number("TODOLIST_SHUTDOWN_TIMEOUT_SECS", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?;

        if api_token.is_none() {
            warn!("TODOLIST_API_TOKEN is not set - the HTTP API accepts unauthenticated requests");
        }

        Ok(Self {
            github: GitHubConfig {
                owner,
                repo,
                token,
                branch,
                api_url,
            },
            port,
            api_token,
            data_dir,
            sound_path,
            notifier,
            reminder_poll_interval: Duration::from_millis(poll_ms),
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        })
    }
}

/// Reads a variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parses a numeric variable, returning `default` when unset.
fn parse_number<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match optional(key) {
        Some(val) => val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected non-negative integer, got '{val}'"),
        }),
        None => Ok(default),
    }
}
