//! Configuration file handling for Seven Senders order tracking.
//!
//! Settings live in a `.sevensenders.toml` file. Three of them are required
//! before anything is exported: the API base URL, the API access key and the
//! tracking page base URL. Everything else has a default.
//!
//! # Example
//!
//! ```
//! use sevensenders_config::Config;
//!
//! let config = Config::from_toml_str(r#"
//! [api]
//! access_key = "secret"
//!
//! [tracking]
//! page_base_url = "https://shop.example.com/tracking/"
//! "#).expect("parse");
//!
//! assert!(config.missing_required().is_empty());
//! assert_eq!(config.tracking_page_base_url(), Some("https://shop.example.com/tracking"));
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use sevensenders_types::STATE_DELIVERED;

pub use sevensenders_retry::{ReauthPolicy, RetryStrategyType};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".sevensenders.toml";

/// Default Seven Senders API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.sevensenders.com/v2";

/// Environment variable overriding the configured access key
pub const ACCESS_KEY_ENV: &str = "SEVENSENDERS_ACCESS_KEY";

/// Setting names reported by [`Config::missing_required`].
pub const SETTING_API_BASE_URL: &str = "api.base_url";
pub const SETTING_API_ACCESS_KEY: &str = "api.access_key";
pub const SETTING_TRACKING_PAGE_BASE_URL: &str = "tracking.page_base_url";

/// Longest accepted reconciliation look-back, in days.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Get the config file path for a directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    tracking: TrackingConfig,
    #[serde(default)]
    shop: ShopConfig,
    #[serde(default)]
    delivery: DeliveryConfig,
    #[serde(default)]
    reauth: ReauthPolicy,
    #[serde(default)]
    logging: LoggingConfig,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and normalize configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        Ok(config.normalized())
    }

    /// Trim whitespace, drop trailing slashes from URLs and turn empty
    /// strings into absent values.
    pub fn normalized(mut self) -> Self {
        self.api.base_url = normalize_url(self.api.base_url.take());
        self.api.access_key = normalize_text(self.api.access_key.take());
        self.tracking.page_base_url = normalize_url(self.tracking.page_base_url.take());
        self.delivery.completed_state = self.delivery.completed_state.trim().to_string();
        self.shop.utc_offset = self.shop.utc_offset.trim().to_string();
        self
    }

    /// Replace the access key (e.g. with one resolved from the environment).
    pub fn with_access_key(mut self, key: Option<String>) -> Self {
        self.api.access_key = normalize_text(key);
        self
    }

    pub fn api_base_url(&self) -> Option<&str> {
        self.api.base_url.as_deref()
    }

    pub fn access_key(&self) -> Option<&str> {
        self.api.access_key.as_deref()
    }

    pub fn tracking_page_base_url(&self) -> Option<&str> {
        self.tracking.page_base_url.as_deref()
    }

    /// Timeout applied to every API request
    pub fn request_timeout(&self) -> Duration {
        self.api.timeout
    }

    /// How long the supported-carrier list stays cached
    pub fn carrier_cache_ttl(&self) -> Duration {
        self.api.carrier_cache_ttl
    }

    /// Shop UTC offset used for planned pickup times.
    pub fn shop_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.shop.utc_offset)
    }

    pub fn delivery_tracking_enabled(&self) -> bool {
        self.delivery.enabled
    }

    /// Remote state that marks an order as delivered.
    pub fn completed_state(&self) -> &str {
        &self.delivery.completed_state
    }

    /// Size of the rolling reconciliation window.
    pub fn reconciliation_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.delivery.window_days))
    }

    pub fn schedule(&self) -> Schedule {
        self.delivery.schedule
    }

    pub fn reauth_policy(&self) -> &ReauthPolicy {
        &self.reauth
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    /// Names of the required settings that are absent.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api.base_url.is_none() {
            missing.push(SETTING_API_BASE_URL);
        }
        if self.api.access_key.is_none() {
            missing.push(SETTING_API_ACCESS_KEY);
        }
        if self.tracking.page_base_url.is_none() {
            missing.push(SETTING_TRACKING_PAGE_BASE_URL);
        }
        missing
    }

    /// Whether every required setting is present.
    pub fn settings_exist(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Check that present values are well-formed.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (name, value) in [
            (SETTING_API_BASE_URL, self.api_base_url()),
            (SETTING_TRACKING_PAGE_BASE_URL, self.tracking_page_base_url()),
        ] {
            if let Some(value) = value
                && let Err(err) = validate_url(value)
            {
                problems.push(format!("{name}: {err}"));
            }
        }

        if let Err(err) = self.shop_offset() {
            problems.push(format!("shop.utc_offset: {err}"));
        }

        if self.delivery.completed_state.is_empty() {
            problems.push("delivery.completed_state: must not be empty".to_string());
        }

        if self.delivery.window_days == 0 {
            problems.push("delivery.window_days: must be at least 1".to_string());
        } else if self.delivery.window_days > MAX_WINDOW_DAYS {
            problems.push(format!(
                "delivery.window_days: must be at most {MAX_WINDOW_DAYS}"
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            bail!("invalid configuration:\n  {}", problems.join("\n  "))
        }
    }
}

/// API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_carrier_cache_ttl", with = "humantime_serde")]
    pub carrier_cache_ttl: Duration,
}

fn default_base_url() -> Option<String> {
    Some(DEFAULT_API_BASE_URL.to_string())
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_carrier_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_key: None,
            timeout: default_timeout(),
            carrier_cache_ttl: default_carrier_cache_ttl(),
        }
    }
}

/// Customer-facing tracking page settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_base_url: Option<String>,
}

/// Shop-local settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopConfig {
    /// UTC offset of the shop, e.g. `+01:00`
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
        }
    }
}

/// How often delivery dates are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    Daily,
    Weekly,
}

impl Schedule {
    pub fn interval(&self) -> chrono::Duration {
        match self {
            Schedule::Daily => chrono::Duration::days(1),
            Schedule::Weekly => chrono::Duration::weeks(1),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Daily => write!(f, "daily"),
            Schedule::Weekly => write!(f, "weekly"),
        }
    }
}

/// Delivery date tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_completed_state")]
    pub completed_state: String,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default)]
    pub schedule: Schedule,
}

fn default_completed_state() -> String {
    STATE_DELIVERED.to_string()
}

fn default_window_days() -> u32 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            completed_state: default_completed_state(),
            window_days: default_window_days(),
            schedule: Schedule::default(),
        }
    }
}

/// Log output toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub warnings: bool,
    #[serde(default = "default_true")]
    pub errors: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            warnings: true,
            errors: true,
        }
    }
}

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LoggingConfig {
    /// Least severe level that can pass the toggles; `off` when logging is disabled.
    pub fn filter_directive(&self) -> &'static str {
        if !self.enabled {
            "off"
        } else if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    /// Whether a line at `level` is emitted. Each toggle gates its own level.
    pub fn allows(&self, level: LogLevel) -> bool {
        if !self.enabled {
            return false;
        }
        match level {
            LogLevel::Error => self.errors,
            LogLevel::Warn => self.warnings,
            LogLevel::Info => true,
            LogLevel::Debug => self.debug,
        }
    }
}

/// Where the access key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKeySource {
    /// No key found
    None,
    /// From `SEVENSENDERS_ACCESS_KEY`
    Env,
    /// From the configuration file
    ConfigFile,
}

impl std::fmt::Display for AccessKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKeySource::None => write!(f, "none"),
            AccessKeySource::Env => write!(f, "{ACCESS_KEY_ENV}"),
            AccessKeySource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Resolved access key
#[derive(Debug, Clone)]
pub struct AccessKeyInfo {
    pub key: Option<String>,
    pub source: AccessKeySource,
}

/// Resolve the access key: the environment wins over the config file.
pub fn resolve_access_key(config: &Config) -> AccessKeyInfo {
    if let Ok(key) = env::var(ACCESS_KEY_ENV)
        && !key.trim().is_empty()
    {
        return AccessKeyInfo {
            key: Some(key.trim().to_string()),
            source: AccessKeySource::Env,
        };
    }

    match config.access_key() {
        Some(key) => AccessKeyInfo {
            key: Some(key.to_string()),
            source: AccessKeySource::ConfigFile,
        },
        None => AccessKeyInfo {
            key: None,
            source: AccessKeySource::None,
        },
    }
}

/// Parse `Z`, `UTC`, `+HH`, `+HHMM` or `+HH:MM`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("zero offset");
    }

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => bail!("invalid UTC offset '{value}': expected a leading '+' or '-'"),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !matches!(digits.len(), 2 | 4) {
        bail!("invalid UTC offset '{value}'");
    }

    let hours: i32 = digits[..2]
        .parse()
        .with_context(|| format!("invalid UTC offset '{value}'"))?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..]
            .parse()
            .with_context(|| format!("invalid UTC offset '{value}'"))?
    } else {
        0
    };
    if hours > 14 || minutes > 59 {
        bail!("UTC offset '{value}' is out of range");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset '{value}' is out of range"))
}

fn validate_url(value: &str) -> Result<()> {
    let parsed = url::Url::parse(value).with_context(|| format!("'{value}' is not a valid URL"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("'{value}' uses unsupported scheme '{other}'"),
    }
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_url(value: Option<String>) -> Option<String> {
    normalize_text(value)
        .map(|v| v.trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
}

/// Load configuration from a directory
pub fn load_config(dir: &Path) -> Result<Config> {
    load_config_from_file(&config_path(dir))
}

/// Load configuration from a specific file path
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(config.normalized())
}

/// Save configuration to a file
pub fn save_config(dir: &Path, config: &Config) -> Result<()> {
    let path = config_path(dir);

    let content = toml::to_string_pretty(config).context("failed to serialize config to TOML")?;

    std::fs::write(&path, content)
        .with_context(|| format!("failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Find configuration file by walking up the directory tree
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        let config_file = current.join(CONFIG_FILE);
        if config_file.exists() {
            return Some(config_file);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}
