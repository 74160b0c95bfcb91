#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use futures_util::{stream, StreamExt};
use skipper_agent::{
    Assistant, AssistantSettings, ChatModel, ChatRequest, ChunkStream, KeywordIndex, LlmError,
    ModelChunk, Phrases, SessionStore, StaticDirectory, TurnStore,
};
use skipper_server::{
    config::{MessagingConfig, VoiceConfig},
    dedup::MessageDeduper,
    AppState,
};
use skipper_tools::{ToolError, ToolExecutor};
use skipper_types::{ToolInvocation, ToolOutput};
use skipper_voice::{CallControl, MessageSender, VoiceError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tower::ServiceExt;

pub const OPERATOR: &str = "+972500000009";
pub const OWNER: &str = "+972533403449";
pub const PUBLIC_URL: &str = "https://skipper.test";
pub const EMPTY_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// One scripted model response.
pub enum Script {
    Chunks(Vec<ModelChunk>),
    /// Waits before producing the chunks.
    Delayed(Duration, Vec<ModelChunk>),
    Fail,
}

pub fn text(parts: &[&str]) -> Script {
    Script::Chunks(parts.iter().map(|p| ModelChunk::Text(p.to_string())).collect())
}

pub fn delayed_text(delay: Duration, parts: &[&str]) -> Script {
    Script::Delayed(
        delay,
        parts.iter().map(|p| ModelChunk::Text(p.to_string())).collect(),
    )
}

pub fn tools(calls: Vec<ToolInvocation>) -> Script {
    Script::Chunks(calls.into_iter().map(ModelChunk::ToolCall).collect())
}

#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Chunks(chunks)) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Some(Script::Delayed(delay, chunks)) => {
                let wait = stream::once(tokio::time::sleep(delay))
                    .filter_map(|_| async { None::<Result<ModelChunk, LlmError>> });
                Ok(wait.chain(stream::iter(chunks.into_iter().map(Ok))).boxed())
            }
            Some(Script::Fail) | None => Err(LlmError::Api {
                status: 503,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

/// A live-call redirect as the telephony provider would receive it.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub call_sid: String,
    pub twiml: String,
    pub at: Instant,
}

#[derive(Default)]
pub struct RecordingCallControl {
    redirects: Mutex<Vec<Redirect>>,
}

impl RecordingCallControl {
    pub fn redirects(&self) -> Vec<Redirect> {
        self.redirects.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallControl for RecordingCallControl {
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<(), VoiceError> {
        self.redirects.lock().unwrap().push(Redirect {
            call_sid: call_sid.to_string(),
            twiml: twiml.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSender {
    whatsapp: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn whatsapp(&self) -> Vec<(String, String)> {
        self.whatsapp.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_whatsapp(&self, to: &str, body: &str) -> Result<String, VoiceError> {
        self.whatsapp
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok("SMtest".to_string())
    }

    async fn send_sms(&self, _to: &str, _body: &str) -> Result<String, VoiceError> {
        Ok("SMtest".to_string())
    }
}

/// Executes tools by name; `transfer_to_support` asks for an operator.
#[derive(Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.executed.lock().unwrap().push(invocation.name.clone());
        if invocation.name == "transfer_to_support" {
            return Ok(ToolOutput::TransferToOperator);
        }
        Ok(ToolOutput::Result(format!("{} ok", invocation.name)))
    }
}

pub struct Harness {
    pub state: AppState,
    pub app: Router,
    pub model: Arc<ScriptedModel>,
    pub calls: Arc<RecordingCallControl>,
    pub sender: Arc<RecordingSender>,
    pub executor: Arc<RecordingExecutor>,
}

pub fn harness(scripts: Vec<Script>) -> Harness {
    let model = Arc::new(ScriptedModel::new(scripts));
    let calls = Arc::new(RecordingCallControl::default());
    let sender = Arc::new(RecordingSender::default());
    let executor = Arc::new(RecordingExecutor::default());
    let sessions = Arc::new(SessionStore::new());

    let assistant = Assistant::new(
        model.clone(),
        executor.clone(),
        Arc::new(KeywordIndex::empty()),
        Arc::new(StaticDirectory::default()),
        sessions.clone(),
        AssistantSettings::default(),
    );

    let state = AppState {
        assistant: Arc::new(assistant),
        sessions,
        turns: Arc::new(TurnStore::new()),
        call_control: calls.clone(),
        messenger: sender.clone(),
        dedup: Arc::new(MessageDeduper::new()),
        voice: VoiceConfig {
            operator_number: OPERATOR.to_string(),
            ..VoiceConfig::default()
        },
        messaging: MessagingConfig {
            owner_phone: OWNER.to_string(),
            ..MessagingConfig::default()
        },
        public_url: PUBLIC_URL.to_string(),
        phrases: Phrases::default(),
    };
    let app = skipper_server::app(state.clone());

    Harness {
        state,
        app,
        model,
        calls,
        sender,
        executor,
    }
}

/// Posts a form-encoded webhook and returns status and body text.
pub async fn post_form(app: &Router, uri: &str, form: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
