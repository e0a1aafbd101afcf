use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{AlertSeverity, RiskSeverity};

/// Errors raised while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration for the login sentry service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persistence configuration
    pub storage: StorageConfig,
    /// Risk scoring policy
    pub scoring: ScoringConfig,
    /// Alert generation policy
    pub alerting: AlertPolicyConfig,
    /// Notification channels for new alerts
    pub notify: NotifyConfig,
    /// GeoIP database
    pub geoip: GeoIpConfig,
    /// Attempt feed for the daemon
    pub input: InputConfig,
    /// Alert output for the daemon
    pub output: OutputConfig,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Pause before the single retry of a failed attempt insert
    pub retry_backoff_ms: u64,
    /// Attempts and closed alerts older than this are pruned
    pub retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: PathBuf::from("login_sentry.db"),
            busy_timeout_ms: 2000,
            retry_backoff_ms: 50,
            retention_days: 90,
        }
    }
}

/// A failure-streak threshold and what crossing it costs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityTier {
    pub failures: u32,
    pub points: u8,
    pub severity: RiskSeverity,
}

/// Risk scoring policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Trailing window for per-email and per-IP history, in seconds
    pub window_seconds: i64,
    /// Number of recent successful logins kept as the account baseline
    pub baseline_size: usize,
    /// Budget for the history lookup before scoring degrades
    pub history_budget_ms: u64,
    pub new_device_points: u8,
    pub new_location_points: u8,
    pub impossible_travel_points: u8,
    /// Maximum plausible travel speed in km/h
    pub max_velocity_kmh: f64,
    pub unusual_time_points: u8,
    /// Baseline logins required before time-of-day is judged
    pub min_baseline_logins: usize,
    /// Share of baseline logins near the current hour below which it is rare
    pub rare_hour_ratio: f64,
    pub cross_account_points: u8,
    /// Distinct emails from one IP within the window that flag stuffing
    pub distinct_email_threshold: usize,
    pub account_state_points: u8,
    /// Failure-streak tiers; the highest tier reached applies
    pub velocity_tiers: Vec<VelocityTier>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            window_seconds: 1800,
            baseline_size: 50,
            history_budget_ms: 250,
            new_device_points: 15,
            new_location_points: 15,
            impossible_travel_points: 30,
            max_velocity_kmh: 900.0,
            unusual_time_points: 10,
            min_baseline_logins: 5,
            rare_hour_ratio: 0.1,
            cross_account_points: 25,
            distinct_email_threshold: 3,
            account_state_points: 5,
            velocity_tiers: vec![
                VelocityTier { failures: 3, points: 20, severity: RiskSeverity::Medium },
                VelocityTier { failures: 5, points: 40, severity: RiskSeverity::High },
                VelocityTier { failures: 8, points: 60, severity: RiskSeverity::High },
            ],
        }
    }
}

/// Alert generation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicyConfig {
    /// Score at or above which an otherwise unmatched attempt is high risk
    pub high_risk_threshold: u8,
    /// Score at or above which several factors make an alert
    pub medium_risk_threshold: u8,
    /// Repeated signals inside this window update the existing alert
    pub dedup_window_seconds: i64,
    /// Failure streak at which further attempts should be blocked
    pub block_after_failures: u32,
}

impl Default for AlertPolicyConfig {
    fn default() -> Self {
        AlertPolicyConfig {
            high_risk_threshold: 70,
            medium_risk_threshold: 40,
            dedup_window_seconds: 3600,
            block_after_failures: 10,
        }
    }
}

/// Notification configuration for newly created alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Alerts below this severity are not sent anywhere
    pub min_severity: AlertSeverity,
    pub slack: Option<SlackConfig>,
    pub discord: Option<DiscordConfig>,
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            enabled: false,
            min_severity: AlertSeverity::High,
            slack: None,
            discord: None,
            webhooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

/// GeoIP configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    /// Path to a GeoLite2-City database; lookups are skipped when unset
    pub database_path: Option<PathBuf>,
}

/// Attempt feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// JSON-lines file the authentication service appends attempts to
    pub file_path: PathBuf,
    /// Read the whole file on startup instead of tailing from the end
    pub from_beginning: bool,
    pub poll_interval_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            file_path: PathBuf::from("/var/log/marketplace/auth_attempts.jsonl"),
            from_beginning: false,
            poll_interval_ms: 100,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: "jsonl".to_string(),
            file_path: Some(PathBuf::from("security_alerts.jsonl")),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            log::warn!("Config file {:?} not found, using defaults", path);
            Ok(Config::default())
        }
    }
}
