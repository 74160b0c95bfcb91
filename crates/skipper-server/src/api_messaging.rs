//! WhatsApp and SMS webhooks.
//!
//! Both channels answer with a messaging markup document carrying the
//! assistant's full reply. Duplicate deliveries, empty bodies and failures
//! all answer with an empty document, so no error text ever reaches the
//! customer.

use crate::{AppState, Twiml};
use axum::{
    extract::{rejection::FormRejection, Extension, Form},
    http::StatusCode,
};
use serde::Deserialize;
use skipper_types::Channel;
use skipper_voice::{strip_whatsapp_prefix, TwimlBuilder};
use std::sync::Arc;
use tracing::{info, warn};

/// Form fields Twilio posts to the messaging webhooks.
#[derive(Debug, Default, Deserialize)]
pub struct MessageWebhook {
    #[serde(rename = "Body")]
    pub body: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
    #[serde(rename = "NumMedia")]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0")]
    pub media_url0: Option<String>,
}

impl MessageWebhook {
    fn media_count(&self) -> u32 {
        self.num_media
            .as_deref()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    }

    fn text(&self) -> &str {
        self.body.as_deref().map(str::trim).unwrap_or_default()
    }
}

fn message_fields(form: Result<Form<MessageWebhook>, FormRejection>) -> MessageWebhook {
    match form {
        Ok(Form(fields)) => fields,
        Err(e) => {
            warn!(error = %e, "unreadable messaging webhook body");
            MessageWebhook::default()
        }
    }
}

fn empty_reply() -> Twiml {
    Twiml(TwimlBuilder::new().build())
}

async fn assistant_reply(
    state: &AppState,
    session_id: &str,
    channel: Channel,
    phone: &str,
    text: &str,
) -> Twiml {
    match state
        .assistant
        .reply(session_id, channel, Some(phone), text)
        .await
    {
        Ok(reply) if !reply.trim().is_empty() => {
            Twiml(TwimlBuilder::new().message(&reply).build())
        }
        Ok(_) => empty_reply(),
        Err(e) => {
            warn!(session = session_id, channel = channel.as_str(), error = %e, "reply failed");
            empty_reply()
        }
    }
}

/// Sends an attachment link to the owner for manual review.
async fn forward_media(state: &AppState, from: &str, media_url: &str) {
    let owner = &state.messaging.owner_phone;
    if owner.is_empty() {
        warn!(from, "media received but no owner phone configured");
        return;
    }
    let text = format!(
        "📸 *קבלה/קובץ מלקוח!*\nמאת: {}\nהנה הקובץ: {}",
        from, media_url
    );
    if let Err(e) = state.messenger.send_whatsapp(owner, &text).await {
        warn!(from, error = %e, "media forward failed");
    }
}

/// Handler for `POST /whatsapp`.
pub async fn whatsapp_handler(
    Extension(state): Extension<Arc<AppState>>,
    form: Result<Form<MessageWebhook>, FormRejection>,
) -> Twiml {
    let fields = message_fields(form);
    if !state
        .dedup
        .first_delivery(Channel::WhatsApp, fields.message_sid.as_deref())
    {
        warn!(
            sid = fields.message_sid.as_deref().unwrap_or_default(),
            "duplicate whatsapp message ignored"
        );
        return empty_reply();
    }

    let from = fields.from.as_deref().unwrap_or_default();
    if fields.media_count() > 0 {
        info!(from, "media received");
        let media_url = fields.media_url0.as_deref().unwrap_or_default();
        forward_media(&state, from, media_url).await;
        return Twiml(
            TwimlBuilder::new()
                .message(&state.phrases.media_received)
                .build(),
        );
    }

    let text = fields.text();
    if text.is_empty() {
        return empty_reply();
    }

    let phone = strip_whatsapp_prefix(from);
    info!(from = phone, "whatsapp message received");
    assistant_reply(&state, phone, Channel::WhatsApp, phone, text).await
}

/// Handler for `POST /sms`.
pub async fn sms_handler(
    Extension(state): Extension<Arc<AppState>>,
    form: Result<Form<MessageWebhook>, FormRejection>,
) -> Twiml {
    let fields = message_fields(form);
    if !state
        .dedup
        .first_delivery(Channel::Sms, fields.message_sid.as_deref())
    {
        warn!(
            sid = fields.message_sid.as_deref().unwrap_or_default(),
            "duplicate sms ignored"
        );
        return empty_reply();
    }

    let text = fields.text();
    if text.is_empty() {
        return empty_reply();
    }

    let from = fields.from.as_deref().unwrap_or_default();
    info!(from, "sms received");
    let session_id = format!("sms:{}", from);
    assistant_reply(&state, &session_id, Channel::Sms, from, text).await
}

/// Handler for `POST /whatsapp/status` and `POST /sms/status`.
pub async fn status_handler() -> StatusCode {
    StatusCode::OK
}
