use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when no forecast API key is configured.
pub const FORECAST_API_KEY_ENV: &str = "NIMBUS_FORECAST_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Refresh behaviour
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Remote service endpoints
    #[serde(default)]
    pub services: ServiceConfig,

    /// Local storage
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Cached forecasts younger than this are reused without touching the network
    #[serde(default = "default_update_threshold_minutes")]
    pub update_threshold_minutes: u32,

    /// Upper bound on waiting for a device position
    #[serde(default = "default_geolocation_timeout_secs")]
    pub geolocation_timeout_secs: u64,
}

fn default_update_threshold_minutes() -> u32 {
    10
}

fn default_geolocation_timeout_secs() -> u64 {
    30
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            update_threshold_minutes: default_update_threshold_minutes(),
            geolocation_timeout_secs: default_geolocation_timeout_secs(),
        }
    }
}

impl WeatherConfig {
    pub fn update_threshold(&self) -> Duration {
        Duration::from_secs(u64::from(self.update_threshold_minutes) * 60)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Reverse geocoding endpoint (Nominatim-compatible)
    pub location_api_url: String,

    /// Forecast endpoint (Dark Sky-compatible)
    pub forecast_api_url: String,

    /// Forecast API key (optional, can be set via environment)
    pub forecast_api_key: Option<String>,

    /// IP geolocation endpoint used for the "current" location
    pub geolocation_api_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            location_api_url: "https://nominatim.openstreetmap.org".to_string(),
            forecast_api_url: "https://api.pirateweather.net".to_string(),
            forecast_api_key: None,
            geolocation_api_url: "https://ipapi.co/json/".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Configured key, falling back to the environment.
    pub fn forecast_api_key(&self) -> Option<String> {
        self.forecast_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(FORECAST_API_KEY_ENV).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding the settings and data slots, relative to `config_dir`
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "nimbus.db".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            services: ServiceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(
            &self.services.location_api_url,
            "services.location_api_url",
            &mut result,
        );
        self.validate_url(
            &self.services.forecast_api_url,
            "services.forecast_api_url",
            &mut result,
        );
        self.validate_url(
            &self.services.geolocation_api_url,
            "services.geolocation_api_url",
            &mut result,
        );

        if self.services.forecast_api_key().is_none() {
            result.add_warning(
                "services.forecast_api_key",
                format!(
                    "No forecast API key configured (set it here or via {})",
                    FORECAST_API_KEY_ENV
                ),
            );
        }

        if self.weather.update_threshold_minutes == 0 {
            result.add_warning(
                "weather.update_threshold_minutes",
                "Cache disabled (0 minutes) - every load hits the network",
            );
        } else if self.weather.update_threshold_minutes > 1440 {
            result.add_warning(
                "weather.update_threshold_minutes",
                "Update threshold is more than 24 hours",
            );
        }

        if self.weather.geolocation_timeout_secs == 0 {
            result.add_error(
                "weather.geolocation_timeout_secs",
                "Geolocation timeout must be greater than 0",
            );
        }

        if self.storage.database_file.trim().is_empty() {
            result.add_error("storage.database_file", "Database file name is empty");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Path of the SQLite database backing persisted settings and data
    pub fn database_path(&self) -> PathBuf {
        self.config_dir.join(&self.storage.database_file)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}
