//! Sitter service configuration.
//!
//! Configuration is loaded from environment variables. The bot token is
//! redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default snapshot file.
pub const DEFAULT_STATE_FILE: &str = "onbot_state.json";

/// Default server time offset from UTC in minutes (UTC−1).
pub const DEFAULT_SERVER_UTC_OFFSET_MINUTES: i32 = -60;

/// Default broadcast interval for groups that never configured one.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;

/// Floor applied to every broadcast interval.
pub const DEFAULT_MIN_INTERVAL_MINUTES: u32 = 5;

/// Default bound on a single delivery call.
pub const DEFAULT_DELIVERY_TIMEOUT_SECONDS: u64 = 10;

/// Default Discord REST base URL.
pub const DEFAULT_DISCORD_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Largest offset a fixed time zone may have (±18h).
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Interval rules for recurring broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPolicy {
    /// Interval used when a group never configured one.
    pub default_minutes: u32,
    /// Floor every interval is clamped to.
    pub min_minutes: u32,
}

impl IntervalPolicy {
    /// Clamp a requested interval to the floor.
    #[must_use]
    pub fn clamp(&self, minutes: u32) -> u32 {
        minutes.max(self.min_minutes)
    }

    /// Sleep duration between broadcasts for a stored interval.
    #[must_use]
    pub fn sleep_for(&self, minutes: u32) -> Duration {
        Duration::from_secs(u64::from(self.clamp(minutes)) * 60)
    }
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            default_minutes: DEFAULT_INTERVAL_MINUTES,
            min_minutes: DEFAULT_MIN_INTERVAL_MINUTES,
        }
    }
}

/// Sitter service configuration.
#[derive(Clone)]
pub struct Config {
    /// Discord bot token used for REST delivery.
    pub discord_token: SecretString,

    /// Snapshot file path (default: "onbot_state.json").
    pub state_file: PathBuf,

    /// Server time zone offset from UTC in minutes (default: -60).
    pub server_utc_offset_minutes: i32,

    /// Broadcast interval rules.
    pub intervals: IntervalPolicy,

    /// Bound on a single delivery call in seconds (default: 10).
    pub delivery_timeout_seconds: u64,

    /// Discord REST base URL.
    pub discord_api_base_url: String,

    /// Restart broadcast tasks for held groups at startup (default: true).
    pub resume_broadcasts: bool,

    /// Log output format (default: text).
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("state_file", &self.state_file)
            .field("server_utc_offset_minutes", &self.server_utc_offset_minutes)
            .field("intervals", &self.intervals)
            .field("delivery_timeout_seconds", &self.delivery_timeout_seconds)
            .field("discord_api_base_url", &self.discord_api_base_url)
            .field("resume_broadcasts", &self.resume_broadcasts)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let discord_token = vars
            .get("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .map(|token| SecretString::from(token.clone()))
            .ok_or_else(|| ConfigError::MissingEnvVar("DISCORD_TOKEN".to_string()))?;

        let state_file = vars
            .get("STATE_FILE")
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from);

        let server_utc_offset_minutes: i32 = parse_var(
            vars,
            "SITTER_SERVER_UTC_OFFSET_MINUTES",
            DEFAULT_SERVER_UTC_OFFSET_MINUTES,
        )?;
        if server_utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::InvalidValue(format!(
                "SITTER_SERVER_UTC_OFFSET_MINUTES must be within ±{MAX_UTC_OFFSET_MINUTES}, got {server_utc_offset_minutes}"
            )));
        }

        let min_minutes: u32 = parse_var(
            vars,
            "SITTER_MIN_INTERVAL_MINUTES",
            DEFAULT_MIN_INTERVAL_MINUTES,
        )?;
        if min_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "SITTER_MIN_INTERVAL_MINUTES must be at least 1".to_string(),
            ));
        }

        let default_minutes: u32 = parse_var(
            vars,
            "SITTER_DEFAULT_INTERVAL_MINUTES",
            DEFAULT_INTERVAL_MINUTES,
        )?;
        if default_minutes < min_minutes {
            return Err(ConfigError::InvalidValue(format!(
                "SITTER_DEFAULT_INTERVAL_MINUTES ({default_minutes}) is below SITTER_MIN_INTERVAL_MINUTES ({min_minutes})"
            )));
        }

        let delivery_timeout_seconds: u64 = parse_var(
            vars,
            "SITTER_DELIVERY_TIMEOUT_SECONDS",
            DEFAULT_DELIVERY_TIMEOUT_SECONDS,
        )?;
        if delivery_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SITTER_DELIVERY_TIMEOUT_SECONDS must be at least 1".to_string(),
            ));
        }

        let discord_api_base_url = vars
            .get("DISCORD_API_BASE_URL")
            .map_or(DEFAULT_DISCORD_API_BASE_URL, String::as_str)
            .trim_end_matches('/')
            .to_string();

        let resume_broadcasts = match vars.get("SITTER_RESUME_BROADCASTS") {
            None => true,
            Some(value) => parse_bool(value).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "SITTER_RESUME_BROADCASTS must be true or false, got {value}"
                ))
            })?,
        };

        let log_format = match vars.get("SITTER_LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "SITTER_LOG_FORMAT must be text or json, got {other}"
                )))
            }
        };

        Ok(Config {
            discord_token,
            state_file,
            server_utc_offset_minutes,
            intervals: IntervalPolicy {
                default_minutes,
                min_minutes,
            },
            delivery_timeout_seconds,
            discord_api_base_url,
            resume_broadcasts,
            log_format,
        })
    }

    /// Bound on a single delivery call.
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ConfigError::InvalidValue(format!("{name} must be a number, got {raw}: {e}"))
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
