//! Language-model streaming client.
//!
//! [`ChatModel`] is the seam the conversation core generates through. The
//! stream it returns yields text deltas as they arrive and each requested
//! tool invocation once it is complete; the stream ending is the terminal
//! signal. [`OpenAiChatModel`] speaks the OpenAI-compatible
//! `/chat/completions` server-sent-event protocol.

use crate::error::LlmError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use skipper_tools::ToolDeclaration;
use skipper_types::{ToolInvocation, Turn};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// One increment of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    Text(String),
    ToolCall(ToolInvocation),
}

pub type ChunkStream = BoxStream<'static, Result<ModelChunk, LlmError>>;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub tools: Vec<ToolDeclaration>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError>;
}

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: String::new(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Maps a conversation history onto chat-completion messages.
///
/// Tool exchanges become an assistant message carrying `tool_calls` followed
/// by a `tool` message with the JSON-encoded output.
pub fn history_to_messages(system_prompt: &str, history: &[Turn]) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(json!({"role": "system", "content": system_prompt}));

    for (index, turn) in history.iter().enumerate() {
        match turn {
            Turn::User { text } => messages.push(json!({"role": "user", "content": text})),
            Turn::Model { text } => {
                messages.push(json!({"role": "assistant", "content": text}))
            }
            Turn::Tool { invocation, output } => {
                let id = invocation
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", index));
                messages.push(json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": [{
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": invocation.name,
                            "arguments": invocation.args.to_string(),
                        }
                    }]
                }));
                let content =
                    serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string());
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": content,
                }));
            }
        }
    }
    messages
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Incremental decoder for the chat-completion event stream.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<u64, PartialToolCall>,
    done: bool,
}

impl SseDecoder {
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consumes raw bytes and returns the text deltas they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ModelChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                continue;
            }
            match serde_json::from_str::<Value>(data) {
                Ok(event) => self.apply_event(&event, &mut chunks),
                Err(e) => warn!(error = %e, "skipping undecodable stream event"),
            }
        }
        chunks
    }

    fn apply_event(&mut self, event: &Value, chunks: &mut Vec<ModelChunk>) {
        let Some(delta) = event["choices"][0].get("delta") else {
            return;
        };
        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                chunks.push(ModelChunk::Text(content.to_string()));
            }
        }
        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    entry.id = Some(id.to_string());
                }
                if let Some(name) = call["function"].get("name").and_then(Value::as_str) {
                    entry.name.push_str(name);
                }
                if let Some(args) = call["function"].get("arguments").and_then(Value::as_str) {
                    entry.arguments.push_str(args);
                }
            }
        }
    }

    /// Returns the assembled tool invocations in index order.
    pub fn finish(self) -> Result<Vec<ToolInvocation>, LlmError> {
        self.tool_calls
            .into_values()
            .map(|partial| {
                let args = if partial.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&partial.arguments).map_err(|e| {
                        LlmError::Decode(format!(
                            "arguments for {} are not JSON: {}",
                            partial.name, e
                        ))
                    })?
                };
                Ok(ToolInvocation {
                    id: partial.id,
                    name: partial.name,
                    args,
                })
            })
            .collect()
    }
}

/// Streaming client for OpenAI-compatible chat-completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    config: LlmConfig,
    http: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|decl| {
                json!({
                    "type": "function",
                    "function": {
                        "name": decl.name,
                        "description": decl.description,
                        "parameters": decl.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": history_to_messages(&request.system_prompt, &request.history),
            "temperature": self.config.temperature,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(item) = bytes.next().await {
                match item {
                    Ok(raw) => {
                        for chunk in decoder.feed(&raw) {
                            if tx.send(Ok(chunk)).await.is_err() {
                                debug!("model stream receiver dropped");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Http(e))).await;
                        return;
                    }
                }
                if decoder.is_done() {
                    break;
                }
            }

            match decoder.finish() {
                Ok(calls) => {
                    for call in calls {
                        if tx.send(Ok(ModelChunk::ToolCall(call))).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
