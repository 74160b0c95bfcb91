//! The conversation core: prepares each generation, streams the model,
//! records history, and runs tool batches.

use crate::crm::CustomerDirectory;
use crate::error::AgentError;
use crate::llm::{ChatModel, ChatRequest, ModelChunk};
use crate::prompt::{self, PromptInputs};
use crate::retrieval::Retriever;
use crate::segment::{parse_gender_marker, strip_markers, Segmenter};
use crate::session::SessionStore;
use crate::turn::TurnOutcome;
use futures_util::StreamExt;
use skipper_tools::{ToolDeclaration, ToolExecutor};
use skipper_types::{Channel, ToolInvocation, ToolOutput, Turn};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

/// Output recorded when an executor fails outright.
pub const TOOL_FAILURE_TEXT: &str = "Error executing tool.";

/// Receives the progress of one streamed turn.
///
/// Exactly one of `on_complete` or `on_error` is called, after all
/// fragments.
pub trait TurnSink: Send + Sync {
    fn on_fragment(&self, fragment: String);
    fn on_complete(&self, outcome: TurnOutcome);
    fn on_error(&self, error: AgentError);
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Passages retrieved per generation.
    pub top_k: usize,
    /// Zone the prompt's current time is given in.
    pub timezone: Tz,
    /// Upper bound on execute-then-regenerate rounds in one tool batch.
    pub max_tool_rounds: usize,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            timezone: Tz::Asia__Jerusalem,
            max_tool_rounds: 3,
        }
    }
}

/// Result of running a tool batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolBatchOutcome {
    /// A tool asked for a human operator on a voice call.
    Transfer,
    /// The follow-up answer, if the model produced any text.
    Reply(Option<String>),
}

struct Prepared {
    context: String,
    system_prompt: String,
}

struct Generation {
    raw_text: String,
    tool_calls: Vec<ToolInvocation>,
}

pub struct Assistant {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolExecutor>,
    retriever: Arc<dyn Retriever>,
    directory: Arc<dyn CustomerDirectory>,
    sessions: Arc<SessionStore>,
    declarations: Vec<ToolDeclaration>,
    settings: AssistantSettings,
}

impl Assistant {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<dyn ToolExecutor>,
        retriever: Arc<dyn Retriever>,
        directory: Arc<dyn CustomerDirectory>,
        sessions: Arc<SessionStore>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            model,
            tools,
            retriever,
            directory,
            sessions,
            declarations: skipper_tools::tool_declarations(),
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn system_prompt(&self, session_id: &str, context: &str, phone: Option<&str>) -> String {
        let local_time = prompt::local_time(self.settings.timezone);
        prompt::build_system_prompt(&PromptInputs {
            context,
            gender: self.sessions.gender(session_id),
            local_time: &local_time,
            caller_phone: phone,
        })
    }

    async fn prepare(
        &self,
        session_id: &str,
        channel: Channel,
        phone: Option<&str>,
        message: &str,
    ) -> Prepared {
        self.sessions.init(session_id, channel);
        if let Some(phone) = phone {
            self.sessions.set_caller_phone(session_id, phone);
        }

        let domain = match prompt::detect_domain(message) {
            Some(detected) => {
                let previous = self.sessions.domain(session_id);
                if previous != Some(detected) {
                    info!(session = session_id, ?previous, ?detected, "subject domain changed");
                    self.sessions.set_domain(session_id, detected);
                }
                Some(detected)
            }
            None => self.sessions.domain(session_id),
        };
        let query = prompt::retrieval_query(message, domain);

        let lookup_phone = phone.filter(|_| self.sessions.gender(session_id).is_none());
        let (context, customer) = tokio::join!(
            self.retriever.retrieve(&query, self.settings.top_k),
            async {
                match lookup_phone {
                    Some(phone) => self.directory.lookup(phone).await,
                    None => None,
                }
            }
        );

        let context = context.unwrap_or_else(|e| {
            warn!(session = session_id, error = %e, "retrieval failed, continuing without context");
            String::new()
        });
        if let Some(gender) = customer.and_then(|c| c.gender) {
            self.sessions.set_gender(session_id, gender);
        }

        let system_prompt = self.system_prompt(session_id, &context, phone);
        Prepared {
            context,
            system_prompt,
        }
    }

    async fn generate<F>(
        &self,
        system_prompt: String,
        history: Vec<Turn>,
        mut on_fragment: F,
    ) -> Result<Generation, AgentError>
    where
        F: FnMut(String) + Send,
    {
        let mut stream = self
            .model
            .stream_chat(ChatRequest {
                system_prompt,
                history,
                tools: self.declarations.clone(),
            })
            .await?;

        let mut segmenter = Segmenter::new();
        let mut raw_text = String::new();
        let mut tool_calls = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                ModelChunk::Text(delta) => {
                    raw_text.push_str(&delta);
                    for fragment in segmenter.push(&delta) {
                        on_fragment(fragment);
                    }
                }
                ModelChunk::ToolCall(invocation) => tool_calls.push(invocation),
            }
        }
        if let Some(rest) = segmenter.finish() {
            on_fragment(rest);
        }

        Ok(Generation {
            raw_text,
            tool_calls,
        })
    }

    /// Writes a finished generation into the session.
    ///
    /// The user turn (if any) is always recorded. A plain answer is recorded
    /// as a marker-free model turn after its gender marker updates the
    /// session; requested tools are handed back unrecorded.
    fn record(
        &self,
        session_id: &str,
        user_text: Option<&str>,
        generation: Generation,
        context: String,
    ) -> TurnOutcome {
        if let Some(text) = user_text {
            self.sessions.append(session_id, Turn::user(text));
        }

        let text = strip_markers(&generation.raw_text);
        if !generation.tool_calls.is_empty() {
            return TurnOutcome {
                text,
                tool_calls: generation.tool_calls,
                context,
            };
        }

        if let Some(gender) = parse_gender_marker(&generation.raw_text) {
            self.sessions.set_gender(session_id, gender);
        }
        self.sessions.append(session_id, Turn::model(text.clone()));
        TurnOutcome {
            text,
            tool_calls: Vec::new(),
            context,
        }
    }

    /// Streams one voice turn into `sink`.
    pub async fn stream_turn(
        &self,
        session_id: &str,
        phone: Option<&str>,
        message: &str,
        sink: &dyn TurnSink,
    ) {
        match self.stream_turn_inner(session_id, phone, message, sink).await {
            Ok(outcome) => sink.on_complete(outcome),
            Err(e) => {
                warn!(session = session_id, error = %e, "voice turn generation failed");
                sink.on_error(e);
            }
        }
    }

    async fn stream_turn_inner(
        &self,
        session_id: &str,
        phone: Option<&str>,
        message: &str,
        sink: &dyn TurnSink,
    ) -> Result<TurnOutcome, AgentError> {
        let prepared = self.prepare(session_id, Channel::Voice, phone, message).await;
        let mut history = self.sessions.history(session_id);
        history.push(Turn::user(message));

        let generation = self
            .generate(prepared.system_prompt, history, |fragment| {
                sink.on_fragment(fragment)
            })
            .await?;
        Ok(self.record(session_id, Some(message), generation, prepared.context))
    }

    /// Produces a complete text reply for a messaging channel, executing any
    /// requested tools before answering.
    pub async fn reply(
        &self,
        session_id: &str,
        channel: Channel,
        phone: Option<&str>,
        message: &str,
    ) -> Result<String, AgentError> {
        let prepared = self.prepare(session_id, channel, phone, message).await;
        let mut history = self.sessions.history(session_id);
        history.push(Turn::user(message));

        let generation = self
            .generate(prepared.system_prompt, history, |_| {})
            .await?;
        let outcome = self.record(session_id, Some(message), generation, prepared.context);
        if !outcome.requires_tools() {
            return Ok(outcome.text);
        }

        match self
            .run_tools(session_id, channel, outcome.tool_calls, &outcome.context)
            .await?
        {
            ToolBatchOutcome::Reply(text) => Ok(text.unwrap_or_default()),
            ToolBatchOutcome::Transfer => Ok(outcome.text),
        }
    }

    /// Executes a tool batch in request order, then asks the model for a
    /// follow-up answer using the batch's original retrieval context.
    ///
    /// A failing executor is recorded as [`TOOL_FAILURE_TEXT`] and the batch
    /// continues. On a voice call a transfer ends the batch at once.
    pub async fn run_tools(
        &self,
        session_id: &str,
        channel: Channel,
        invocations: Vec<ToolInvocation>,
        context: &str,
    ) -> Result<ToolBatchOutcome, AgentError> {
        let phone = self.sessions.caller_phone(session_id);
        let mut batch = invocations;

        for round in 0..self.settings.max_tool_rounds {
            for invocation in batch {
                let output = match self.tools.execute(&invocation).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(session = session_id, tool = %invocation.name, error = %e, "tool failed");
                        ToolOutput::Error(TOOL_FAILURE_TEXT.to_string())
                    }
                };
                let transfer = output.is_transfer();
                self.sessions
                    .append(session_id, Turn::Tool { invocation, output });
                if transfer && channel == Channel::Voice {
                    info!(session = session_id, "operator transfer requested");
                    return Ok(ToolBatchOutcome::Transfer);
                }
            }

            let system_prompt = self.system_prompt(session_id, context, phone.as_deref());
            let history = self.sessions.history(session_id);
            let generation = self.generate(system_prompt, history, |_| {}).await?;
            let outcome = self.record(session_id, None, generation, context.to_string());
            if !outcome.requires_tools() {
                let text = Some(outcome.text).filter(|t| !t.trim().is_empty());
                return Ok(ToolBatchOutcome::Reply(text));
            }
            info!(session = session_id, round, "follow-up requested more tools");
            batch = outcome.tool_calls;
        }

        warn!(session = session_id, "tool round limit reached without a final answer");
        Ok(ToolBatchOutcome::Reply(None))
    }
}
