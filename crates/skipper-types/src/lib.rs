//! Shared types for the Skipper booking assistant.
//!
//! This crate provides the vocabulary used across all Skipper crates: the
//! channel a conversation arrives on, the entries of a conversation history,
//! tool invocation requests and their outputs, and the small pieces of
//! inferred caller context (gender guess, subject domain).
//!
//! No crate in the workspace depends on anything *except* `skipper-types` for
//! cross-cutting type definitions, which keeps the dependency graph acyclic.

pub mod voice;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use voice::Language;

/// The surface a conversation session originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// A live phone call.
    Voice,
    /// A WhatsApp chat message.
    WhatsApp,
    /// A plain SMS text message.
    Sms,
}

impl Channel {
    /// Returns the lowercase label used in logs and dedup keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::WhatsApp => "whatsapp",
            Self::Sms => "sms",
        }
    }

    /// Whether replies on this channel are rendered as text messages.
    pub fn is_messaging(self) -> bool {
        matches!(self, Self::WhatsApp | Self::Sms)
    }
}

/// Caller gender guess, used to pick grammatical forms in Hebrew replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Parses a case-insensitive `male` / `female` label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

/// Business line a conversation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectDomain {
    /// Yacht charters and sailing trips.
    Yachts,
    /// Payment terminals and point-of-sale devices.
    Terminals,
}

impl SubjectDomain {
    pub fn label(self) -> &'static str {
        match self {
            Self::Yachts => "Yachts",
            Self::Terminals => "Terminals",
        }
    }
}

/// A structured request from the model to perform a side-effecting action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call identifier, when the model API supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name as declared to the model.
    pub name: String,
    /// JSON object of arguments.
    #[serde(default)]
    pub args: Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            args,
        }
    }

    /// Returns a string argument, or `None` when absent or not a string.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// The outcome of executing one tool invocation.
///
/// Serialises as `{"result": ...}`, `{"error": ...}` or
/// `"transferToOperator"`, which is what the model sees in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolOutput {
    /// Human-readable result text for the model.
    Result(String),
    /// The tool could not complete.
    Error(String),
    /// The caller should be handed to a human operator.
    TransferToOperator,
}

impl ToolOutput {
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::TransferToOperator)
    }
}

/// One entry of a conversation history.
///
/// Histories are append-only; entries are never reordered or truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Something the caller said or wrote.
    User { text: String },
    /// Something the assistant said or wrote.
    Model { text: String },
    /// A tool invocation paired with its output.
    Tool {
        invocation: ToolInvocation,
        output: ToolOutput,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::Model { text: text.into() }
    }
}
