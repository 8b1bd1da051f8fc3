use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    config::TwilioConfig,
    error::{Error, Result},
};

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";
const MAX_MESSAGE_LEN: usize = 1600;
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers short text alerts to a phone number.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> Result<()>;
}

fn validate_sms(recipient: &str, message: &str) -> Result<()> {
    let recipient = recipient.trim();
    if recipient.len() != 10 || !recipient.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation(format!("invalid recipient phone: {recipient:?}")));
    }
    let message = message.trim();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_LEN {
        return Err(Error::validation(format!(
            "message must be between 1 and {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(())
}

/// Sends alerts as SMS through the Twilio REST API.
pub struct TwilioNotifier {
    client: Client,
    config: TwilioConfig,
    base_url: String,
}

impl TwilioNotifier {
    pub fn new(config: TwilioConfig) -> Result<Self> {
        Self::with_base_url(config, TWILIO_API, SEND_TIMEOUT)
    }

    /// Each send gives up after `timeout`, connecting included.
    pub fn with_base_url(
        config: TwilioConfig,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<()> {
        validate_sms(recipient, message)?;

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        );
        let to = format!("+1{}", recipient.trim());
        let form = [
            ("From", self.config.from_phone.as_str()),
            ("To", to.as_str()),
            ("Body", message.trim()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::notification(format!("twilio request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::notification(format!("twilio returned {status}: {body}")));
        }

        info!(recipient, "sms alert delivered");
        Ok(())
    }
}

/// Fallback used when no SMS provider is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<()> {
        validate_sms(recipient, message)?;
        warn!(recipient, message, "no sms provider configured, alert only logged");
        Ok(())
    }
}
