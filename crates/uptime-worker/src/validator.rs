//! Check validation: raw records in, typed checks out.
//!
//! The record store hands back whatever JSON another surface wrote. Every
//! required field is checked (not just the first bad one) so a rejected
//! record's warning names everything that is wrong with it.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use uptime_core::{Check, CheckRules, CheckState, Method, Protocol};

/// Highest accepted `timeoutSeconds`.
pub const MAX_TIMEOUT_SECONDS: u8 = 5;

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: &'static str,
}

/// Why a raw check record was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// The record's id, when it had a usable one.
    pub check_id: Option<String>,
    pub fields: Vec<FieldError>,
}

impl ValidationReport {
    pub fn failed_fields(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.field).collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.check_id {
            Some(id) => write!(f, "invalid check {id}: ")?,
            None => f.write_str("invalid check: ")?,
        }
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field.field, field.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// Normalizes raw check records into [`Check`]s.
#[derive(Debug, Clone, Default)]
pub struct CheckValidator {
    rules: CheckRules,
}

impl CheckValidator {
    pub fn new(rules: CheckRules) -> Self {
        Self { rules }
    }

    /// Validate `raw`, filling `state` and `lastCheckedAt` defaults for
    /// checks the worker has never seen.
    pub fn validate(&self, raw: &Value) -> Result<Check, ValidationReport> {
        let Some(record) = raw.as_object() else {
            return Err(ValidationReport {
                check_id: None,
                fields: vec![FieldError {
                    field: "record",
                    reason: "is not an object",
                }],
            });
        };

        let mut fields = Vec::new();
        let mut fail = |field: &'static str, reason: &'static str| {
            fields.push(FieldError { field, reason });
        };

        let id = trimmed_str(record.get("id"));
        let id = match id {
            Some(id) if id.chars().count() == self.rules.token_length => Some(id),
            _ => {
                fail("id", "must be a token of the configured length");
                None
            }
        };

        // `phone` is the key older records used for the owner.
        let owner_id = trimmed_str(record.get("ownerId").or_else(|| record.get("phone")));
        let owner_id = match owner_id {
            Some(owner) if owner.chars().count() == self.rules.owner_id_length => Some(owner),
            _ => {
                fail("ownerId", "must be an identifier of the configured length");
                None
            }
        };

        let protocol = trimmed_str(record.get("protocol")).and_then(Protocol::parse);
        if protocol.is_none() {
            fail("protocol", "must be one of http, https");
        }

        let url = trimmed_str(record.get("url")).filter(|u| !u.is_empty());
        if url.is_none() {
            fail("url", "must be a non-empty string");
        }

        let method = trimmed_str(record.get("method")).and_then(Method::parse);
        if method.is_none() {
            fail("method", "must be one of get, post, put, delete");
        }

        let success_codes = parse_success_codes(record.get("successCodes"));
        if success_codes.is_none() {
            fail("successCodes", "must be a non-empty list of HTTP status codes");
        }

        let timeout_seconds = parse_timeout(record.get("timeoutSeconds"));
        if timeout_seconds.is_none() {
            fail("timeoutSeconds", "must be a whole number between 1 and 5");
        }

        let (
            Some(id),
            Some(owner_id),
            Some(protocol),
            Some(url),
            Some(method),
            Some(success_codes),
            Some(timeout_seconds),
        ) = (id, owner_id, protocol, url, method, success_codes, timeout_seconds)
        else {
            let check_id = trimmed_str(record.get("id"))
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            return Err(ValidationReport { check_id, fields });
        };

        let state = trimmed_str(record.get("state"))
            .and_then(CheckState::parse)
            .unwrap_or_default();
        let last_checked_at =
            parse_timestamp(record.get("lastCheckedAt").or_else(|| record.get("lastChecked")));

        debug!(check_id = %id, %state, ?last_checked_at, "check record validated");

        Ok(Check {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            protocol,
            url: url.to_string(),
            method,
            success_codes,
            timeout_seconds,
            state,
            last_checked_at,
        })
    }
}

fn trimmed_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim)
}

/// A whole JSON number, accepting `3.0` as well as `3`.
fn whole_number(value: &Value) -> Option<f64> {
    let n = value.as_f64()?;
    (n.fract() == 0.0).then_some(n)
}

fn parse_success_codes(value: Option<&Value>) -> Option<Vec<u16>> {
    let items = value?.as_array()?;
    if items.is_empty() {
        return None;
    }
    let mut codes = Vec::with_capacity(items.len());
    for item in items {
        let code = whole_number(item)?;
        if !(100.0..=599.0).contains(&code) {
            return None;
        }
        let code = code as u16;
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    Some(codes)
}

fn parse_timeout(value: Option<&Value>) -> Option<u8> {
    let secs = whole_number(value?)?;
    (1.0..=f64::from(MAX_TIMEOUT_SECONDS))
        .contains(&secs)
        .then_some(secs as u8)
}

/// Positive timestamps only; anything else means "never checked".
fn parse_timestamp(value: Option<&Value>) -> Option<u64> {
    let ts = value?.as_f64()?;
    (ts >= 1.0).then_some(ts as u64)
}
