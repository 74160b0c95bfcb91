use crate::config::TelephonyConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

/// Redirects a live call to new markup (used to interrupt hold music).
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<(), VoiceError>;
}

/// Sends outbound text messages. Both methods return the provider message id.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_whatsapp(&self, to: &str, body: &str) -> Result<String, VoiceError>;
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, VoiceError>;
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Strips a `whatsapp:` address prefix if present.
pub fn strip_whatsapp_prefix(address: &str) -> &str {
    address.strip_prefix("whatsapp:").unwrap_or(address)
}

/// Thin REST client for the Twilio voice and messaging APIs.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    config: TelephonyConfig,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: TelephonyConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// The business number outbound traffic is sent from.
    pub fn phone_number(&self) -> &str {
        &self.config.phone_number
    }

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid,
            resource
        )
    }

    async fn post_form(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::Config(
                "Twilio credentials missing (account_sid, auth_token, phone_number)".to_string(),
            ));
        }

        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<String, VoiceError> {
        let url = self.account_url("Messages.json");
        let response = self
            .post_form(url, &[("From", from), ("To", to), ("Body", body)])
            .await?;
        let resource: MessageResource = response.json().await?;
        Ok(resource.sid)
    }
}

#[async_trait]
impl CallControl for TwilioClient {
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<(), VoiceError> {
        let url = self.account_url(&format!("Calls/{}.json", call_sid));
        self.post_form(url, &[("Twiml", twiml)]).await?;
        info!(call_sid, "live call redirected");
        Ok(())
    }
}

#[async_trait]
impl MessageSender for TwilioClient {
    async fn send_whatsapp(&self, to: &str, body: &str) -> Result<String, VoiceError> {
        // Normalise both ends so a prefixed address never becomes
        // `whatsapp:whatsapp:...`.
        let from = format!("whatsapp:{}", strip_whatsapp_prefix(&self.config.phone_number));
        let to = format!("whatsapp:{}", strip_whatsapp_prefix(to));
        match self.send_message(&from, &to, body).await {
            Ok(sid) => {
                info!(to = %to, sid = %sid, "whatsapp message sent");
                Ok(sid)
            }
            Err(e) => {
                warn!(to = %to, error = %e, "whatsapp send failed");
                Err(e)
            }
        }
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<String, VoiceError> {
        let to = strip_whatsapp_prefix(to);
        let sid = self
            .send_message(&self.config.phone_number, to, body)
            .await?;
        info!(to, sid = %sid, "sms sent");
        Ok(sid)
    }
}
