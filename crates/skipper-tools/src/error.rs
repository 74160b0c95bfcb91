//! Error types for the tool execution layer.

/// Errors raised while executing a tool invocation.
///
/// The conversation layer never propagates these to the caller; a failed
/// invocation is recorded as a generic error output and the batch continues.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A required argument is missing or malformed.
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// The calendar backend failed.
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Building or sending an e-mail failed.
    #[error("mail error: {0}")]
    Mail(String),

    /// A shared lock was poisoned by a panicking holder.
    #[error("tool state unavailable: {0}")]
    State(String),

    /// Reading or writing local state failed.
    #[error("tool storage error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("tool serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
