//! Spoken-language definitions.
//!
//! The telephony layer needs to pick a synthesis voice that matches the text
//! it is about to speak. Detection is deliberately a small deterministic
//! contract rather than a statistical classifier: Hebrew-block characters
//! select Hebrew, Cyrillic characters select Russian, everything else falls
//! back to English.

use serde::{Deserialize, Serialize};

/// Languages the assistant can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Hebrew,
    Russian,
    English,
}

impl Language {
    /// Detects the spoken language of `text`.
    pub fn detect(text: &str) -> Self {
        if text.chars().any(is_hebrew) {
            Self::Hebrew
        } else if text.chars().any(is_cyrillic) {
            Self::Russian
        } else {
            Self::English
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Hebrew => "he",
            Self::Russian => "ru",
            Self::English => "en",
        }
    }
}

fn is_hebrew(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}

fn is_cyrillic(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}
