use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ErrorCode;

/// Env var holding the Todoist API token. Takes precedence over the file.
pub const TOKEN_ENV: &str = "TODOIST_API_TOKEN";
pub const FORCE_SYNC_ENV: &str = "ORCHESTRA_FORCE_SYNC";
pub const DRY_RUN_ENV: &str = "ORCHESTRA_DRY_RUN";

const REDACTED: &str = "<redacted>";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no Todoist API token configured")]
    MissingToken,
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::MissingToken => ErrorCode::MissingApiToken,
        }
    }
}

/// Effective orchestra configuration.
///
/// Plain values come before tables so the struct serializes back to TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Ignore the local snapshot and request a full pull.
    #[serde(default)]
    pub force_sync: bool,
    /// Run the pipeline without advancing the stored sync cursor.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub todoist: TodoistConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub alarms: AlarmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoistConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the project whose tasks become rituals.
    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for TodoistConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
            project: default_project(),
        }
    }
}

impl TodoistConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured token, or [`ConfigError::MissingToken`] when none is set.
    pub fn token(&self) -> Result<&str, ConfigError> {
        self.api_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingToken)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot: PathBuf,
    #[serde(default = "default_rituals_path")]
    pub rituals: PathBuf,
    /// Override for the embedded Todoist payload schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todoist_schema: Option<PathBuf>,
    /// Override for the embedded ritual document schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rituals_schema: Option<PathBuf>,
    #[serde(default = "default_alarms_path")]
    pub alarms: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot_path(),
            rituals: default_rituals_path(),
            todoist_schema: None,
            rituals_schema: None,
            alarms: default_alarms_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_day_hour_start")]
    pub day_hour_start: u32,
    #[serde(default = "default_day_hour_end")]
    pub day_hour_end: u32,
    #[serde(default = "default_alarm_title")]
    pub title: String,
    /// Program and arguments; `{title}` and `{time}` are substituted. Empty
    /// disables alarms.
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            day_hour_start: default_day_hour_start(),
            day_hour_end: default_day_hour_end(),
            title: default_alarm_title(),
            command: Vec::new(),
        }
    }
}

/// `$XDG_CONFIG_HOME/orchestra/config.toml` or the platform equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("orchestra").join("config.toml"))
}

impl Config {
    /// Parse a config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the effective configuration.
    ///
    /// An explicit `path` must exist. Without one the default location is
    /// used when present, otherwise built-in defaults. Process env overrides
    /// are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply env overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.todoist.api_token = Some(token);
        }
        if let Some(value) = lookup(FORCE_SYNC_ENV) {
            self.force_sync = is_truthy(&value);
        }
        if let Some(value) = lookup(DRY_RUN_ENV) {
            self.dry_run = is_truthy(&value);
        }
    }

    /// A copy safe to print: the API token is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.todoist.api_token.is_some() {
            copy.todoist.api_token = Some(REDACTED.to_string());
        }
        copy
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_api_url() -> String {
    "https://api.todoist.com/sync/v9/sync".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_project() -> String {
    crate::ritual::extract::MONITORED_PROJECT.to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/todoist.json")
}

fn default_rituals_path() -> PathBuf {
    PathBuf::from("data/rituals.json")
}

fn default_alarms_path() -> PathBuf {
    PathBuf::from("logs/set_alarms.json")
}

const fn default_day_hour_start() -> u32 {
    9
}

const fn default_day_hour_end() -> u32 {
    21
}

fn default_alarm_title() -> String {
    "MEDITATE".to_string()
}
