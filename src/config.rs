//! Application configuration: a TOML file in the user's config directory,
//! overridable per key with `EVE_ALTS_<SECTION>_<KEY>` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const APP_DIR: &str = "eve-alts";
pub const ENV_PREFIX: &str = "EVE_ALTS";
pub const DEFAULT_CLIENT_ID: &str = "5a58af6b66a34b45a8b827e34b81527f";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not encode config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("no config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub serving: ServingConfig,
    pub esi: EsiConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. Empty means `<data dir>/eve-alts/eve-alts.db`.
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    pub hostport: String,
    pub callback_path: String,
    pub callback_scheme: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsiConfig {
    pub client_id: String,
    pub auth_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            hostport: "localhost:8619".to_string(),
            callback_path: "/callback".to_string(),
            callback_scheme: "http".to_string(),
        }
    }
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            auth_timeout_secs: 30,
            refresh_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Parse TOML, fill blank values with defaults and validate.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(raw)?;
        config.fill_defaults();
        config.validate()?;
        Ok(config)
    }

    fn fill_defaults(&mut self) {
        let defaults = AppConfig::default();
        fill(&mut self.logging.level, &defaults.logging.level);
        fill(&mut self.serving.hostport, &defaults.serving.hostport);
        fill(&mut self.serving.callback_path, &defaults.serving.callback_path);
        fill(&mut self.serving.callback_scheme, &defaults.serving.callback_scheme);
        fill(&mut self.esi.client_id, &defaults.esi.client_id);
        if self.esi.auth_timeout_secs == 0 {
            self.esi.auth_timeout_secs = defaults.esi.auth_timeout_secs;
        }
        if self.esi.refresh_timeout_secs == 0 {
            self.esi.refresh_timeout_secs = defaults.esi.refresh_timeout_secs;
        }
        if !self.serving.callback_path.starts_with('/') {
            self.serving.callback_path.insert(0, '/');
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if crate::logging::parse_level_strict(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.logging.level.clone(),
            });
        }
        if !matches!(self.serving.callback_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "serving.callback_scheme".to_string(),
                value: self.serving.callback_scheme.clone(),
            });
        }
        Ok(())
    }

    /// Apply `EVE_ALTS_<SECTION>_<KEY>` overrides. `lookup` is normally
    /// `std::env::var`, injectable so tests don't touch the process env.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |section: &str, key: &str| {
            let name = format!("{}_{}_{}", ENV_PREFIX, section, key).to_uppercase();
            lookup(&name).map(|v| (name, v))
        };
        let number = |name: String, value: String| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue { key: name, value })
        };

        if let Some((_, v)) = var("database", "location") {
            self.database.location = v;
        }
        if let Some((_, v)) = var("logging", "level") {
            self.logging.level = v;
        }
        if let Some((_, v)) = var("serving", "hostport") {
            self.serving.hostport = v;
        }
        if let Some((_, v)) = var("serving", "callback_path") {
            self.serving.callback_path = v;
        }
        if let Some((_, v)) = var("serving", "callback_scheme") {
            self.serving.callback_scheme = v;
        }
        if let Some((_, v)) = var("esi", "client_id") {
            self.esi.client_id = v;
        }
        if let Some((name, v)) = var("esi", "auth_timeout_secs") {
            self.esi.auth_timeout_secs = number(name, v)?;
        }
        if let Some((name, v)) = var("esi", "refresh_timeout_secs") {
            self.esi.refresh_timeout_secs = number(name, v)?;
        }

        self.fill_defaults();
        self.validate()
    }

    /// Where the OAuth callback server is reached from the browser.
    pub fn callback_url(&self) -> String {
        format!(
            "{}://{}{}",
            self.serving.callback_scheme, self.serving.hostport, self.serving.callback_path
        )
    }

    pub fn database_path(&self, default_dir: &Path) -> PathBuf {
        if self.database.location.trim().is_empty() {
            default_dir.join("eve-alts.db")
        } else {
            PathBuf::from(self.database.location.trim())
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        crate::logging::parse_level(&self.logging.level)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.esi.auth_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.esi.refresh_timeout_secs)
    }
}

fn fill(value: &mut String, default: &str) {
    if value.trim().is_empty() {
        *value = default.to_string();
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}

/// Read the config at `path`, writing a default file first if none exists.
pub fn load_or_create(path: &Path) -> Result<AppConfig, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = toml::to_string_pretty(&AppConfig::default())?;
        fs::write(path, raw).map_err(io_err)?;
        log::info!("[load_or_create] Wrote default config to {}", path.display());
    }

    let raw = fs::read_to_string(path).map_err(io_err)?;
    AppConfig::from_toml(&raw)
}

/// Load the config from its default location and apply environment overrides.
pub fn load() -> Result<AppConfig, ConfigError> {
    let path = default_config_path()?;
    let mut config = load_or_create(&path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}
