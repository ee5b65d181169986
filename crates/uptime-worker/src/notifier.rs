//! Alert delivery.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::{debug, info};

use uptime_core::{Protocol, TwilioConfig};

use crate::transport::{HttpClient, Target, TransportError};

/// Longest SMS body Twilio accepts.
pub const MAX_MESSAGE_CHARS: usize = 1600;

const TWILIO_API: &str = "api.twilio.com";
const TWILIO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid recipient: {0:?}")]
    InvalidRecipient(String),

    #[error("message must be 1..=1600 characters, got {0}")]
    InvalidMessage(usize),

    #[error("invalid header: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("provider answered with status {0}")]
    Rejected(u16),

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

/// Sends a short text message to a recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError>;
}

/// Records alerts in the process log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        info!(%recipient, %message, "alert");
        Ok(())
    }
}

/// Sends alerts as SMS through the Twilio messages API.
#[derive(Clone)]
pub struct TwilioNotifier {
    config: TwilioConfig,
    /// Expected recipient length (the owner id length).
    recipient_length: usize,
    client: HttpClient,
    api_protocol: Protocol,
    api_host: String,
}

impl TwilioNotifier {
    pub fn new(config: TwilioConfig, recipient_length: usize, client: HttpClient) -> Self {
        Self {
            config,
            recipient_length,
            client,
            api_protocol: Protocol::Https,
            api_host: TWILIO_API.to_string(),
        }
    }

    /// Point the notifier at a different API host (tests, proxies).
    pub fn with_api_host(mut self, protocol: Protocol, host: impl Into<String>) -> Self {
        self.api_protocol = protocol;
        self.api_host = host.into();
        self
    }

    fn form_body(&self, recipient: &str, message: &str) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("From", &self.config.from_phone)
            .append_pair("To", &format!("{}{recipient}", self.config.country_prefix))
            .append_pair("Body", message)
            .finish()
    }

    fn headers(&self) -> Result<HeaderMap, NotifyError> {
        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.config.account_sid, self.config.auth_token
        ));
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::try_from(format!("Basic {credentials}"))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let recipient = recipient.trim();
        if recipient.chars().count() != self.recipient_length {
            return Err(NotifyError::InvalidRecipient(recipient.to_string()));
        }
        let message = message.trim();
        let chars = message.chars().count();
        if chars == 0 || chars > MAX_MESSAGE_CHARS {
            return Err(NotifyError::InvalidMessage(chars));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_host, self.config.account_sid
        );
        let target = Target::parse(self.api_protocol, &url)?;
        let body = Bytes::from(self.form_body(recipient, message));

        let status = tokio::time::timeout(
            TWILIO_TIMEOUT,
            self.client
                .send(&target, http::Method::POST, self.headers()?, body),
        )
        .await
        .map_err(|_| NotifyError::Timeout(TWILIO_TIMEOUT))??;

        match status.as_u16() {
            200 | 201 => {
                debug!(%recipient, "sms accepted");
                Ok(())
            }
            code => Err(NotifyError::Rejected(code)),
        }
    }
}
