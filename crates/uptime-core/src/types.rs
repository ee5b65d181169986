//! Shared types used across the uptime crates.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Record store collection holding every monitored check.
pub const CHECKS_COLLECTION: &str = "checks";

/// URL scheme used to reach a check's endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method a check issues against its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            "put" => Some(Method::Put),
            "delete" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }

    /// Wire form of the method (`GET`, `POST`, ...).
    pub fn as_upper(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a check as of its last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    #[default]
    Down,
}

impl CheckState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(CheckState::Up),
            "down" => Some(CheckState::Down),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Up => "up",
            CheckState::Down => "down",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Check ──────────────────────────────────────────────────────────

/// A validated, monitored endpoint plus its expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: String,
    pub owner_id: String,
    pub protocol: Protocol,
    /// Host plus path (and optional query), without the scheme.
    pub url: String,
    pub method: Method,
    /// Status codes that count as a successful probe. Never empty, no duplicates.
    pub success_codes: Vec<u16>,
    pub timeout_seconds: u8,
    #[serde(default)]
    pub state: CheckState,
    /// Unix timestamp (milliseconds) of the last completed probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<u64>,
}

impl Check {
    pub fn is_success_code(&self, code: u16) -> bool {
        self.success_codes.contains(&code)
    }

    /// Whether this check has ever completed a probe.
    pub fn has_been_checked(&self) -> bool {
        self.last_checked_at.is_some()
    }

    /// `protocol://url` as shown to owners.
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }
}

// ── Outcome ────────────────────────────────────────────────────────

/// How a probe failed, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    None,
    TransportError,
    Timeout,
}

/// Classified result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub failed: bool,
    pub failure_kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    /// Transport error text, when the probe failed before a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Outcome {
    /// The endpoint answered with `code`.
    pub fn response(code: u16) -> Self {
        Self {
            failed: false,
            failure_kind: FailureKind::None,
            response_code: Some(code),
            detail: None,
        }
    }

    /// The transport failed before any response arrived.
    pub fn transport_error(detail: impl Into<String>) -> Self {
        Self {
            failed: true,
            failure_kind: FailureKind::TransportError,
            response_code: None,
            detail: Some(detail.into()),
        }
    }

    /// The probe's timeout elapsed first.
    pub fn timeout() -> Self {
        Self {
            failed: true,
            failure_kind: FailureKind::Timeout,
            response_code: None,
            detail: None,
        }
    }
}

// ── Log record ─────────────────────────────────────────────────────

/// One line of a check's history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// The check as it was before the probe.
    pub check: Check,
    pub outcome: Outcome,
    pub state: CheckState,
    pub alert_raised: bool,
    /// Unix timestamp (milliseconds).
    pub observed_at: u64,
}

impl LogRecord {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Milliseconds since the unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
