//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Config file loading (optional)
//! - Environment variable overrides
//! - Runtime defaults
//! - Validation
//! - Per-cycle reloading through [`ConfigSource`]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::{Service, SessionIdentity};
use crate::power::{MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};
use crate::tracker::{AlertConfig, FramingMode};

pub const CONFIG_FILE_NAME: &str = "usage-watch.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Refresh cadence and retry policy
    pub polling: PollingConfig,

    /// Threshold alerts
    pub alerts: AlertsConfig,

    /// Claude usage endpoint
    pub claude: ClaudeConfig,

    /// Codex usage endpoint
    pub codex: CodexConfig,

    /// Notification delivery
    pub notifications: NotificationConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub reduce_on_battery: bool,
    pub battery_floor_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Consecutive failed cycles before a service's last reading is dropped
    pub stale_after_failures: u32,
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            reduce_on_battery: true,
            battery_floor_secs: 30,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            stale_after_failures: 3,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub thresholds: Vec<u8>,
    pub framing: FramingMode,
    pub sessions: SessionToggles,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![75, 90, 95],
            framing: FramingMode::Usage,
            sessions: SessionToggles::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToggles {
    pub claude_five_hour: bool,
    pub claude_seven_day: bool,
    pub codex_primary: bool,
    pub codex_secondary: bool,
}

impl Default for SessionToggles {
    fn default() -> Self {
        Self {
            claude_five_hour: true,
            claude_seven_day: true,
            codex_primary: true,
            codex_secondary: true,
        }
    }
}

impl SessionToggles {
    pub fn is_enabled(&self, identity: SessionIdentity) -> bool {
        match identity {
            SessionIdentity::ClaudeFiveHour => self.claude_five_hour,
            SessionIdentity::ClaudeSevenDay => self.claude_seven_day,
            SessionIdentity::CodexPrimary => self.codex_primary,
            SessionIdentity::CodexSecondary => self.codex_secondary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Never written back out
    #[serde(skip_serializing)]
    pub session_key: Option<String>,
    /// Also report status.claude.com health in `snapshot`
    pub check_status: bool,
    pub status_url: String,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://claude.ai/api".to_string(),
            session_key: None,
            check_status: true,
            status_url: "https://status.claude.com/api/v2/summary.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexConfig {
    pub enabled: bool,
    pub base_url: String,
    pub auth_file: PathBuf,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://chatgpt.com/backend-api".to_string(),
            auth_file: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".codex")
                .join("auth.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// `log`, `desktop` or `command`
    pub sink: String,
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sink: "desktop".to_string(),
            command: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("usage-watch")
                .join("logs"),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, environment, and defaults
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`] but an explicit path wins over the search list
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::locate() {
                Some(path) => {
                    info!(config_file = %path.display(), "Loading configuration from file");
                    Self::load_from_file(&path)?
                }
                None => Config::default(),
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// First existing file from the search list
    pub fn locate() -> Option<PathBuf> {
        let candidates = [
            Some(PathBuf::from(CONFIG_FILE_NAME)),
            Some(PathBuf::from(format!(".{CONFIG_FILE_NAME}"))),
            dirs::config_dir().map(|d| d.join("usage-watch").join("config.toml")),
        ];

        candidates.into_iter().flatten().find(|path| path.exists())
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Polling overrides
        if let Ok(val) = env::var("USAGE_WATCH_INTERVAL_SECS") {
            self.polling.interval_secs = val
                .parse()
                .context("Invalid USAGE_WATCH_INTERVAL_SECS")?;
        }
        if let Ok(val) = env::var("USAGE_WATCH_REDUCE_ON_BATTERY") {
            self.polling.reduce_on_battery = val
                .parse()
                .context("Invalid USAGE_WATCH_REDUCE_ON_BATTERY")?;
        }
        if let Ok(val) = env::var("USAGE_WATCH_MAX_ATTEMPTS") {
            self.polling.max_attempts = val
                .parse()
                .context("Invalid USAGE_WATCH_MAX_ATTEMPTS")?;
        }

        // Alert overrides
        if let Ok(val) = env::var("USAGE_WATCH_THRESHOLDS") {
            self.alerts.thresholds = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<u8>)
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid USAGE_WATCH_THRESHOLDS")?;
        }
        if let Ok(val) = env::var("USAGE_WATCH_FRAMING") {
            self.alerts.framing = val
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid USAGE_WATCH_FRAMING")?;
        }

        // Service overrides
        if let Ok(val) = env::var("CLAUDE_SESSION_KEY") {
            self.claude.session_key = Some(val);
        }
        if let Ok(val) = env::var("CLAUDE_API_BASE_URL") {
            self.claude.base_url = val;
        }
        if let Ok(val) = env::var("CLAUDE_STATUS_URL") {
            self.claude.status_url = val;
        }
        if let Ok(val) = env::var("CODEX_API_BASE_URL") {
            self.codex.base_url = val;
        }
        if let Ok(val) = env::var("CODEX_AUTH_FILE") {
            self.codex.auth_file = PathBuf::from(val);
        }

        // Path overrides
        if let Ok(val) = env::var("USAGE_WATCH_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.alerts.thresholds.is_empty() {
            return Err(anyhow::anyhow!("At least one alert threshold is required"));
        }

        if let Some(bad) = self
            .alerts
            .thresholds
            .iter()
            .find(|t| !(1..=100).contains(*t))
        {
            return Err(anyhow::anyhow!(
                "Alert thresholds must be between 1 and 100, got {}",
                bad
            ));
        }

        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.polling.interval_secs) {
            return Err(anyhow::anyhow!(
                "Refresh interval must be between {}s and {}s, got {}s",
                MIN_INTERVAL_SECS,
                MAX_INTERVAL_SECS,
                self.polling.interval_secs
            ));
        }

        if self.polling.max_attempts == 0 {
            return Err(anyhow::anyhow!("Max attempts must be greater than 0"));
        }

        if self.polling.stale_after_failures == 0 {
            return Err(anyhow::anyhow!("Stale-after failure count must be greater than 0"));
        }

        if self.polling.request_timeout_secs == 0 {
            warn!("Request timeout of 0s disables the per-request timeout");
        }

        if !self.claude.enabled && !self.codex.enabled {
            warn!("Both services are disabled, nothing will be polled");
        }

        if matches!(self.logging.output.as_str(), "file" | "both")
            && !self.paths.log_directory.exists()
        {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Alert settings the tracker for `identity` should use this cycle
    pub fn alert_config(&self, identity: SessionIdentity) -> AlertConfig {
        AlertConfig::new(
            self.alerts.thresholds.clone(),
            self.alerts.framing,
            self.alerts.sessions.is_enabled(identity),
        )
    }

    pub fn service_enabled(&self, service: Service) -> bool {
        match service {
            Service::Claude => self.claude.enabled,
            Service::Codex => self.codex.enabled,
        }
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Supplies the configuration snapshot for each polling cycle
pub trait ConfigSource: Send + Sync {
    fn snapshot(&mut self) -> Config;
}

/// Never changes; used by tests and one-shot commands
#[derive(Debug, Clone)]
pub struct StaticConfig(pub Config);

impl ConfigSource for StaticConfig {
    fn snapshot(&mut self) -> Config {
        self.0.clone()
    }
}

/// Re-reads file and environment every cycle, keeping the last good result
#[derive(Debug, Clone)]
pub struct ReloadingConfig {
    path: Option<PathBuf>,
    interval_override: Option<u64>,
    last_good: Config,
}

impl ReloadingConfig {
    pub fn new(path: Option<PathBuf>, initial: Config) -> Self {
        Self {
            path,
            interval_override: None,
            last_good: initial,
        }
    }

    /// Pin the refresh interval regardless of what the file says
    pub fn with_interval_override(mut self, interval_secs: Option<u64>) -> Self {
        self.interval_override = interval_secs;
        if let Some(secs) = interval_secs {
            self.last_good.polling.interval_secs = secs;
        }
        self
    }

    fn reload(&self) -> Result<Config> {
        let mut config = Config::load_with(self.path.as_deref())?;
        if let Some(secs) = self.interval_override {
            config.polling.interval_secs = secs;
            config.validate()?;
        }
        Ok(config)
    }
}

impl ConfigSource for ReloadingConfig {
    fn snapshot(&mut self) -> Config {
        match self.reload() {
            Ok(config) => {
                if config != self.last_good {
                    info!("Configuration changed, applying on this cycle");
                }
                self.last_good = config;
            }
            Err(e) => {
                warn!(error = %e, "Configuration reload failed, keeping previous configuration");
            }
        }
        debug!(interval_secs = self.last_good.polling.interval_secs, "Configuration snapshot");
        self.last_good.clone()
    }
}
