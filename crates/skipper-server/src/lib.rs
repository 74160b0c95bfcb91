//! Skipper server library logic.
//!
//! Hosts the telephony webhooks (the call turn controller), the messaging
//! webhooks, and the health endpoint on one axum router.

pub mod api_messaging;
pub mod api_voice;
pub mod background;
pub mod config;
pub mod dedup;

use axum::{
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use config::{Config, MessagingConfig, VoiceConfig};
use dedup::MessageDeduper;
use serde_json::{json, Value};
use skipper_agent::{
    AgentError, Assistant, AssistantSettings, KeywordIndex, OpenAiChatModel, Phrases,
    SessionStore, StaticDirectory, TurnStore,
};
use skipper_tools::{BookingSettings, BookingTools, InMemoryCalendar, OrderCounter, SmtpMailer};
use skipper_voice::{CallControl, MessageSender, TwilioClient};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    /// The session store the assistant writes to.
    pub sessions: Arc<SessionStore>,
    /// In-flight voice turns, keyed by call id.
    pub turns: Arc<TurnStore>,
    /// Redirects live calls out of hold music.
    pub call_control: Arc<dyn CallControl>,
    /// Outbound WhatsApp/SMS, used to forward media to the owner.
    pub messenger: Arc<dyn MessageSender>,
    pub dedup: Arc<MessageDeduper>,
    pub voice: VoiceConfig,
    pub messaging: MessagingConfig,
    /// Externally reachable base URL, without a trailing slash.
    pub public_url: String,
    pub phrases: Phrases,
}

impl AppState {
    /// Wires the production collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Retrieval` if the knowledge directory exists but
    /// cannot be read.
    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let twilio = Arc::new(TwilioClient::new(config.telephony.clone()));
        if !twilio.is_enabled() {
            tracing::warn!("telephony credentials missing, live redirects and messages will fail");
        }

        let orders = if config.business.order_counter_path.is_empty() {
            OrderCounter::in_memory()
        } else {
            OrderCounter::open(&config.business.order_counter_path)
        };
        let mut tools = BookingTools::new(
            Arc::new(InMemoryCalendar::new()),
            twilio.clone(),
            Arc::new(orders),
            BookingSettings {
                owner_phone: config.messaging.owner_phone.clone(),
                payment_link: config.business.payment_link.clone(),
                business_number: config.telephony.phone_number.clone(),
                ..BookingSettings::default()
            },
        );
        if config.email.is_configured() {
            match SmtpMailer::new(&config.email) {
                Ok(mailer) => tools = tools.with_mailer(Arc::new(mailer)),
                Err(e) => tracing::warn!(error = %e, "owner e-mail disabled"),
            }
        } else {
            tracing::debug!("no [email] account configured, owner e-mail disabled");
        }

        let index = KeywordIndex::load_dir(&config.knowledge.documents_dir)?;
        let sessions = Arc::new(SessionStore::new());
        let assistant = Assistant::new(
            Arc::new(OpenAiChatModel::new(config.llm.clone())),
            Arc::new(tools),
            Arc::new(index),
            Arc::new(StaticDirectory::new(config.crm.customers.clone())),
            sessions.clone(),
            AssistantSettings {
                top_k: config.knowledge.top_k,
                timezone: config.business.timezone,
                ..AssistantSettings::default()
            },
        );

        Ok(Self {
            assistant: Arc::new(assistant),
            sessions,
            turns: Arc::new(TurnStore::new()),
            call_control: twilio.clone(),
            messenger: twilio,
            dedup: Arc::new(MessageDeduper::new()),
            voice: config.voice.clone(),
            messaging: config.messaging.clone(),
            public_url: config.server.public_url.trim_end_matches('/').to_string(),
            phrases: config.phrases.clone(),
        })
    }

    /// Absolute URL for `path` under the public base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.public_url, path)
    }
}

/// A call-control markup document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.0).into_response()
    }
}

/// Query string carrying a call id, e.g. `CallSid=CA123`.
pub(crate) fn call_query(call_sid: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(call_sid.as_bytes()).collect();
    format!("CallSid={}", encoded)
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/voice", post(api_voice::start_call_handler))
        .route("/respond", post(api_voice::submit_speech_handler))
        .route("/check_ai", post(api_voice::poll_handler))
        .route("/process_tool", post(api_voice::execute_tool_handler))
        .route(
            "/handle-dial-status",
            post(api_voice::operator_return_handler),
        )
        .route("/reprompt", post(api_voice::reprompt_handler))
        .route("/whatsapp", post(api_messaging::whatsapp_handler))
        .route("/sms", post(api_messaging::sms_handler))
        .route("/whatsapp/status", post(api_messaging::status_handler))
        .route("/sms/status", post(api_messaging::status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
