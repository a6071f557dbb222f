use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "SKYCAST_CONFIG";

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

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Returns true for a 5-digit US postal code (no surrounding whitespace).
pub fn is_valid_postal_code(code: &str) -> bool {
    code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream weather API
    #[serde(default)]
    pub api: ApiConfig,

    /// Postal code geocoding
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Retry/backoff for the weather API
    #[serde(default)]
    pub retry: RetrySettings,

    /// Cache sizing and TTL policy
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background refresh of known locations
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the weather API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// User-Agent sent with every request. The upstream usage policy
    /// rejects anonymous clients, so this must identify the application.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.weather.gov".to_string()
}

fn default_user_agent() -> String {
    "Skycast/0.1.0 (https://github.com/skycast/skycast, skycast@example.com)".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Base URL of the postal code lookup service
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_geocoding_base_url() -> String {
    "https://api.zippopotam.us/us".to_string()
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoding_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt (3 means 4 attempts total)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff step; doubles on every retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single backoff step
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    4000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a caller does not pass one
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Interval of the expiry sweep (0 disables the sweeper)
    #[serde(default = "default_check_period_secs")]
    pub check_period_secs: u64,

    /// Maximum number of live keys
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// Per-kind TTL policy
    #[serde(default)]
    pub ttl: TtlPolicyConfig,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_check_period_secs() -> u64 {
    120
}

fn default_max_keys() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl_secs(),
            check_period_secs: default_check_period_secs(),
            max_keys: default_max_keys(),
            ttl: TtlPolicyConfig::default(),
        }
    }
}

/// TTL per data kind, in seconds.
///
/// `alerts_secs` is kept for completeness; alerts are always fetched live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlPolicyConfig {
    #[serde(default = "default_points_secs")]
    pub points_secs: u64,
    #[serde(default = "default_forecast_secs")]
    pub forecast_secs: u64,
    #[serde(default = "default_observation_secs")]
    pub observation_secs: u64,
    #[serde(default = "default_station_secs")]
    pub station_secs: u64,
    #[serde(default = "default_points_secs")]
    pub geocode_secs: u64,
    #[serde(default)]
    pub alerts_secs: u64,
}

fn default_points_secs() -> u64 {
    24 * 60 * 60
}

fn default_forecast_secs() -> u64 {
    60 * 60
}

fn default_observation_secs() -> u64 {
    10 * 60
}

fn default_station_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for TtlPolicyConfig {
    fn default() -> Self {
        Self {
            points_secs: default_points_secs(),
            forecast_secs: default_forecast_secs(),
            observation_secs: default_observation_secs(),
            station_secs: default_station_secs(),
            geocode_secs: default_points_secs(),
            alerts_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_enabled")]
    pub enabled: bool,

    /// Refresh interval in minutes
    #[serde(default = "default_refresh_minutes")]
    pub interval_minutes: u32,

    /// Postal codes kept warm regardless of traffic
    #[serde(default)]
    pub postal_codes: Vec<String>,
}

fn default_refresh_enabled() -> bool {
    true
}

fn default_refresh_minutes() -> u32 {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: default_refresh_enabled(),
            interval_minutes: default_refresh_minutes(),
            postal_codes: Vec::new(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
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

        Self::validate_url(&self.api.base_url, "api.base_url", &mut result);
        Self::validate_url(&self.geocoding.base_url, "geocoding.base_url", &mut result);

        if self.api.user_agent.trim().is_empty() {
            result.add_error(
                "api.user_agent",
                "User-Agent must identify the application",
            );
        }

        if self.api.timeout_secs == 0 {
            result.add_error("api.timeout_secs", "Timeout must be greater than 0");
        }

        if self.geocoding.timeout_secs == 0 {
            result.add_error("geocoding.timeout_secs", "Timeout must be greater than 0");
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            result.add_error(
                "retry.max_delay_ms",
                "Maximum delay must be at least the initial delay",
            );
        }

        if self.cache.max_keys == 0 {
            result.add_error("cache.max_keys", "Cache must allow at least one key");
        }

        if self.cache.check_period_secs == 0 {
            result.add_warning(
                "cache.check_period_secs",
                "Expiry sweep disabled (0 seconds); entries expire lazily",
            );
        }

        if self.cache.ttl.alerts_secs != 0 {
            result.add_warning(
                "cache.ttl.alerts_secs",
                "Alerts are always fetched live; this value is ignored",
            );
        }

        if self.refresh.interval_minutes == 0 {
            result.add_warning(
                "refresh.interval_minutes",
                "Background refresh disabled (0 minutes)",
            );
        }

        for code in &self.refresh.postal_codes {
            if !is_valid_postal_code(code.trim()) {
                result.add_error(
                    "refresh.postal_codes",
                    format!("Not a 5-digit postal code: {:?}", code),
                );
            }
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
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
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
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

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_ttl_policy() {
        let ttl = TtlPolicyConfig::default();
        assert_eq!(ttl.points_secs, 86_400);
        assert_eq!(ttl.forecast_secs, 3_600);
        assert_eq!(ttl.observation_secs, 600);
        assert_eq!(ttl.station_secs, 604_800);
        assert_eq!(ttl.geocode_secs, 86_400);
        assert_eq!(ttl.alerts_secs, 0);
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.api.base_url = "ftp://api.weather.gov".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_empty_user_agent_is_error() {
        let mut config = Config::default();
        config.api.user_agent = "  ".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "api.user_agent"));
    }

    #[test]
    fn test_zero_geocoding_timeout_is_error() {
        let mut config = Config::default();
        config.geocoding.timeout_secs = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "geocoding.timeout_secs"));
    }

    #[test]
    fn test_bad_postal_code_is_error() {
        let mut config = Config::default();
        config.refresh.postal_codes = vec!["75454".to_string(), "7545".to_string()];
        let result = config.validate();
        assert_eq!(result.errors.len(), 1);
        assert!(result.error_summary().contains("7545"));
    }

    #[test]
    fn test_disabled_refresh_is_warning() {
        let mut config = Config::default();
        config.refresh.interval_minutes = 0;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "refresh.interval_minutes"));
    }

    #[test]
    fn test_postal_code_shape() {
        assert!(is_valid_postal_code("75454"));
        assert!(!is_valid_postal_code("7545"));
        assert!(!is_valid_postal_code("75454-1234"));
        assert!(!is_valid_postal_code("7545a"));
        assert!(!is_valid_postal_code(" 75454"));
    }

    #[test]
    fn test_load_writes_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.retry.max_retries, 3);

        let mut edited = created.clone();
        edited.refresh.postal_codes = vec!["75454".to_string()];
        edited.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.refresh.postal_codes, vec!["75454".to_string()]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[refresh]\ninterval_minutes = 15\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.refresh.interval_minutes, 15);
        assert!(config.refresh.enabled);
        assert_eq!(config.api.base_url, "https://api.weather.gov");
        assert_eq!(config.cache.ttl.observation_secs, 600);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\nmax_keys = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }
}
