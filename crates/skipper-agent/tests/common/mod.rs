#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use skipper_agent::{
    AgentError, Assistant, AssistantSettings, ChatModel, ChatRequest, ChunkStream, KeywordIndex,
    LlmError, ModelChunk, SessionStore, StaticDirectory, TurnOutcome, TurnSink,
};
use skipper_tools::{ToolError, ToolExecutor};
use skipper_types::{ToolInvocation, ToolOutput};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted model response.
pub enum Script {
    Chunks(Vec<ModelChunk>),
    Fail,
}

pub fn text(parts: &[&str]) -> Script {
    Script::Chunks(
        parts
            .iter()
            .map(|p| ModelChunk::Text(p.to_string()))
            .collect(),
    )
}

pub fn tools(calls: Vec<ToolInvocation>) -> Script {
    Script::Chunks(calls.into_iter().map(ModelChunk::ToolCall).collect())
}

/// Replays scripted responses in order and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.scripts.lock().unwrap().pop_front() {
            Some(Script::Chunks(chunks)) => {
                Ok(futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
            Some(Script::Fail) | None => Err(LlmError::Api {
                status: 503,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

/// Executes tools by name; names listed in `failing` return an error.
#[derive(Default)]
pub struct RecordingExecutor {
    pub failing: Vec<String>,
    pub executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.executed.lock().unwrap().push(invocation.name.clone());
        if self.failing.contains(&invocation.name) {
            return Err(ToolError::Calendar("calendar offline".to_string()));
        }
        if invocation.name == "transfer_to_support" {
            return Ok(ToolOutput::TransferToOperator);
        }
        Ok(ToolOutput::Result(format!("{} ok", invocation.name)))
    }
}

/// Collects everything a streamed turn reports.
#[derive(Default)]
pub struct CollectingSink {
    pub fragments: Mutex<Vec<String>>,
    pub outcome: Mutex<Option<TurnOutcome>>,
    pub error: Mutex<Option<String>>,
}

impl TurnSink for CollectingSink {
    fn on_fragment(&self, fragment: String) {
        self.fragments.lock().unwrap().push(fragment);
    }

    fn on_complete(&self, outcome: TurnOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
    }

    fn on_error(&self, error: AgentError) {
        *self.error.lock().unwrap() = Some(error.to_string());
    }
}

pub fn assistant(
    model: Arc<ScriptedModel>,
    executor: Arc<RecordingExecutor>,
    index: KeywordIndex,
    directory: StaticDirectory,
) -> Assistant {
    Assistant::new(
        model,
        executor,
        Arc::new(index),
        Arc::new(directory),
        Arc::new(SessionStore::new()),
        AssistantSettings::default(),
    )
}
