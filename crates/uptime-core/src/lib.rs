pub mod config;
pub mod types;

pub use config::{CheckRules, ConfigError, TwilioConfig, UptimeConfig};
pub use types::*;
