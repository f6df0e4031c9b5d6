//! Configuration management for cfp.
//!
//! Loads configuration from ${CFP_HOME}/config.toml with sensible defaults.
//! Environment variables override file values (env > config > default).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_REALTIME_HOST: &str = "localhost";
pub const DEFAULT_REALTIME_PORT: u16 = 6001;
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Channel authorization path on the API host.
const BROADCAST_AUTH_PATH: &str = "/broadcasting/auth";

pub mod env {
    //! Environment variable names recognized by cfp.

    pub const HOME: &str = "CFP_HOME";
    pub const API_BASE_URL: &str = "CFP_API_BASE_URL";
    pub const PUSHER_APP_KEY: &str = "CFP_PUSHER_APP_KEY";
    pub const PUSHER_HOST: &str = "CFP_PUSHER_HOST";
    pub const PUSHER_PORT: &str = "CFP_PUSHER_PORT";
    pub const PUSHER_TLS: &str = "CFP_PUSHER_TLS";
    pub const LOG: &str = "CFP_LOG";
}

pub mod paths {
    //! Path resolution for cfp configuration and data.
    //!
    //! CFP_HOME resolution order:
    //! 1. CFP_HOME environment variable (if set)
    //! 2. ~/.config/cfp (default)

    use std::path::PathBuf;

    /// Returns the cfp home directory.
    pub fn cfp_home() -> PathBuf {
        if let Ok(home) = std::env::var(super::env::HOME) {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("cfp")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        cfp_home().join("config.toml")
    }

    /// Returns the path to the persisted session token.
    pub fn credentials_path() -> PathBuf {
        cfp_home().join("credentials.json")
    }
}

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[realtime]` section (Pusher protocol / Laravel Reverb).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub key: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub auth_endpoint: Option<String>,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: Option<String>,
}

/// Main configuration structure, as written in config.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub log: LogConfig,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// API base URL without a trailing slash.
    pub api_base_url: String,
    pub timeout: Duration,
    pub realtime: RealtimeOptions,
    pub log_filter: String,
}

/// Real-time connection parameters. `key` stays optional here; the
/// realtime module decides what to do when it is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeOptions {
    pub key: Option<String>,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub auth_endpoint: String,
}

impl Config {
    /// Loads configuration from the default path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default template to `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Resolves runtime settings against the process environment.
    ///
    /// # Errors
    /// Returns an error if a URL or port is malformed.
    pub fn settings(&self) -> Result<Settings> {
        self.settings_with(|name| std::env::var(name).ok())
    }

    /// Resolves runtime settings using `lookup` for environment values.
    ///
    /// # Errors
    /// Returns an error if a URL or port is malformed.
    pub fn settings_with<F>(&self, lookup: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_base_url = resolve_base_url(
            env_value(env::API_BASE_URL).as_deref(),
            self.api.base_url.as_deref(),
            DEFAULT_API_BASE_URL,
        )?;

        let key = env_value(env::PUSHER_APP_KEY).or_else(|| {
            self.realtime
                .key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
        });

        let host = env_value(env::PUSHER_HOST)
            .or_else(|| non_empty(self.realtime.host.as_deref()))
            .unwrap_or_else(|| DEFAULT_REALTIME_HOST.to_string());

        let port = match env_value(env::PUSHER_PORT) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid {}: {raw}", env::PUSHER_PORT))?,
            None => self.realtime.port.unwrap_or(DEFAULT_REALTIME_PORT),
        };

        let tls = env_value(env::PUSHER_TLS)
            .map(|raw| parse_bool(&raw))
            .or(self.realtime.tls)
            .unwrap_or(false);

        let auth_endpoint = match non_empty(self.realtime.auth_endpoint.as_deref()) {
            Some(endpoint) if endpoint.starts_with('/') => format!("{api_base_url}{endpoint}"),
            Some(endpoint) => {
                url::Url::parse(&endpoint)
                    .with_context(|| format!("Invalid realtime auth endpoint: {endpoint}"))?;
                endpoint
            }
            None => format!("{api_base_url}{BROADCAST_AUTH_PATH}"),
        };

        let log_filter = env_value(env::LOG)
            .or_else(|| non_empty(self.log.filter.as_deref()))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Settings {
            api_base_url,
            timeout: Duration::from_secs(self.api.timeout_secs.max(1)),
            realtime: RealtimeOptions {
                key,
                host,
                port,
                tls,
                auth_endpoint,
            },
            log_filter,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves a base URL with precedence: env > config > default.
/// The result never ends with a slash.
fn resolve_base_url(
    env_url: Option<&str>,
    config_url: Option<&str>,
    default_url: &str,
) -> Result<String> {
    let chosen = env_url
        .or(config_url.map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or(default_url);
    url::Url::parse(chosen).with_context(|| format!("Invalid API base URL: {chosen}"))?;
    Ok(chosen.trim_end_matches('/').to_string())
}

/// Lenient boolean parsing for env values: `1`, `true`, `yes`, `on`
/// (case-insensitive) are true, anything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
