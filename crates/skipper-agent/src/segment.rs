//! Fragment segmentation for spoken narration.
//!
//! Model text arrives in arbitrary deltas. The [`Segmenter`] regroups it into
//! fragments that end at a natural breakpoint (`, . ? ! ;` or a newline), or
//! after more than [`MAX_FRAGMENT_WORDS`] words when no punctuation shows up.
//!
//! Generated text may carry control markers such as `[GENDER: female]`.
//! Markers never reach a fragment; a marker split across deltas is held back
//! until its closing bracket arrives.

use regex::Regex;
use skipper_types::Gender;
use std::sync::LazyLock;

pub const MAX_FRAGMENT_WORDS: usize = 6;

/// An unclosed `[` longer than this is ordinary text, not a marker.
const MAX_MARKER_LEN: usize = 32;

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(_compile_err) => match Regex::new(r"$^") {
            Ok(fallback) => fallback,
            Err(fallback_err) => panic!("hardcoded fallback regex must compile: {fallback_err}"),
        },
    }
}

static MARKER: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)\[GENDER:[^\]]*\]"));
static GENDER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\[GENDER:\s*(male|female)\s*\]"));

fn is_breakpoint(c: char) -> bool {
    matches!(c, ',' | '.' | '?' | '!' | ';' | '\n')
}

/// Removes control markers and trims the result.
pub fn strip_markers(text: &str) -> String {
    MARKER.replace_all(text, "").trim().to_string()
}

/// Reads the gender marker from a complete response, if any.
pub fn parse_gender_marker(text: &str) -> Option<Gender> {
    GENDER_MARKER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Gender::parse(m.as_str()))
}

/// Text prepared for speech synthesis: markers removed, markdown emphasis
/// dropped, whitespace collapsed.
pub fn speakable(text: &str) -> String {
    let stripped = strip_markers(text).replace(['*', '_', '#'], "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default)]
pub struct Segmenter {
    /// Text that may still be the start of a marker.
    held: String,
    /// Marker-free text not yet emitted.
    pending: String,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one delta and returns the fragments it completes.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.held.push_str(delta);

        let release_to = match self.held.rfind('[') {
            Some(open)
                if !self.held[open..].contains(']')
                    && self.held.len() - open <= MAX_MARKER_LEN =>
            {
                open
            }
            _ => self.held.len(),
        };
        let released: String = self.held.drain(..release_to).collect();
        self.pending.push_str(&MARKER.replace_all(&released, ""));

        self.split_ready()
    }

    fn split_ready(&mut self) -> Vec<String> {
        let mut fragments = Vec::new();
        loop {
            if let Some((idx, c)) = self.pending.char_indices().find(|(_, c)| is_breakpoint(*c)) {
                let end = idx + c.len_utf8();
                let piece: String = self.pending.drain(..end).collect();
                push_clean(&mut fragments, &piece);
                continue;
            }
            if self.pending.split_whitespace().count() > MAX_FRAGMENT_WORDS {
                let piece = std::mem::take(&mut self.pending);
                push_clean(&mut fragments, &piece);
            }
            break;
        }
        fragments
    }

    /// Flushes whatever is left once the model stream has ended.
    pub fn finish(mut self) -> Option<String> {
        let held = std::mem::take(&mut self.held);
        let starts_marker = held
            .get(..8)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("[GENDER:"))
            || "[GENDER:".starts_with(&held.to_ascii_uppercase());
        if !starts_marker {
            self.pending.push_str(&MARKER.replace_all(&held, ""));
        }
        let rest = self.pending.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

fn push_clean(fragments: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        fragments.push(piece.to_string());
    }
}
