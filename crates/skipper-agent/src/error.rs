//! Error types for the conversation core.

use skipper_tools::ToolError;

/// Errors from the language-model client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The HTTP request or response stream failed.
    #[error("llm transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("llm api error {status}: {body}")]
    Api { status: u16, body: String },

    /// A streamed event or tool-call payload could not be decoded.
    #[error("llm decode error: {0}")]
    Decode(String),
}

/// Errors raised while preparing or running a conversation turn.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Context retrieval failed.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Tool execution was requested but nothing was pending for the session.
    #[error("no pending tool invocations for session {0}")]
    NoPendingTools(String),

    /// A shared lock was poisoned by a panicking holder.
    #[error("conversation state unavailable: {0}")]
    State(String),
}
