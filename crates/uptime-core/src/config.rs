//! uptime.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UptimeConfig {
    /// Directory holding the record store.
    pub data_dir: PathBuf,
    /// Directory holding per-check history logs and their archives.
    pub logs_dir: PathBuf,
    pub gather_interval_secs: u64,
    pub rotate_interval_secs: u64,
    pub checks: CheckRules,
    /// SMS alerts are only sent when credentials are present.
    pub twilio: Option<TwilioConfig>,
}

/// Shape constraints applied when validating check records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckRules {
    pub token_length: usize,
    pub owner_id_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    /// Prepended to the owner id to form the destination number.
    #[serde(default = "default_country_prefix")]
    pub country_prefix: String,
}

fn default_country_prefix() -> String {
    "+55".to_string()
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".data"),
            logs_dir: PathBuf::from(".logs"),
            gather_interval_secs: 60,
            rotate_interval_secs: 60 * 60 * 24,
            checks: CheckRules::default(),
            twilio: None,
        }
    }
}

impl Default for CheckRules {
    fn default() -> Self {
        Self {
            token_length: 20,
            owner_id_length: 11,
        }
    }
}

impl UptimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: UptimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gather_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "gather_interval_secs must be positive".to_string(),
            ));
        }
        if self.rotate_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rotate_interval_secs must be positive".to_string(),
            ));
        }
        if self.checks.token_length == 0 || self.checks.owner_id_length == 0 {
            return Err(ConfigError::Invalid(
                "check identifier lengths must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gather_interval(&self) -> Duration {
        Duration::from_secs(self.gather_interval_secs)
    }

    pub fn rotate_interval(&self) -> Duration {
        Duration::from_secs(self.rotate_interval_secs)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("uptime.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = UptimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, UptimeConfig::default());
        assert_eq!(config.gather_interval(), Duration::from_secs(60));
        assert_eq!(config.rotate_interval(), Duration::from_secs(86_400));
        assert_eq!(config.checks.token_length, 20);
        assert_eq!(config.checks.owner_id_length, 11);
        assert!(config.twilio.is_none());
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
data_dir = "/var/lib/uptime"
logs_dir = "/var/log/uptime"
gather_interval_secs = 30
rotate_interval_secs = 3600

[checks]
token_length = 16

[twilio]
account_sid = "AC123"
auth_token = "secret"
from_phone = "+15005550006"
"#;
        let config = UptimeConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/uptime"));
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/uptime/uptime.redb"));
        assert_eq!(config.gather_interval_secs, 30);
        assert_eq!(config.checks.token_length, 16);
        assert_eq!(config.checks.owner_id_length, 11);

        let twilio = config.twilio.unwrap();
        assert_eq!(twilio.account_sid, "AC123");
        assert_eq!(twilio.country_prefix, "+55");
    }

    #[test]
    fn zero_interval_rejected() {
        let err = UptimeConfig::from_toml_str("gather_interval_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = UptimeConfig::from_toml_str("gather_interval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = UptimeConfig::from_file(Path::new("/nonexistent/uptime.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/uptime.toml"));
    }
}
