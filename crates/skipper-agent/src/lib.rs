//! Conversation core for the Skipper booking assistant.
//!
//! Owns everything between a caller's words and the assistant's answer:
//! the streaming language-model client, fragment segmentation, the session
//! and per-call turn stores, context retrieval, customer lookup, prompt
//! assembly and tool batches.

pub mod assistant;
pub mod crm;
pub mod error;
pub mod llm;
pub mod phrases;
pub mod prompt;
pub mod retrieval;
pub mod segment;
pub mod session;
pub mod turn;

pub use assistant::{Assistant, AssistantSettings, ToolBatchOutcome, TurnSink, TOOL_FAILURE_TEXT};
pub use crm::{CustomerDirectory, CustomerEntry, CustomerRecord, StaticDirectory};
pub use error::{AgentError, LlmError};
pub use llm::{ChatModel, ChatRequest, ChunkStream, LlmConfig, ModelChunk, OpenAiChatModel};
pub use phrases::Phrases;
pub use retrieval::{KeywordIndex, Retriever};
pub use segment::{parse_gender_marker, speakable, strip_markers, Segmenter};
pub use session::{PendingTools, Session, SessionStore};
pub use turn::{CallTurnTask, PollStep, TurnOutcome, TurnStatus, TurnStore};
