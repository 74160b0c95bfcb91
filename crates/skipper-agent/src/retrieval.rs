//! Context retrieval for the system prompt.
//!
//! [`KeywordIndex`] splits each document in a directory into paragraphs and
//! ranks them by how many distinct query words they contain. The result is
//! concatenated into one context block.

use crate::error::AgentError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `top_k` passages for `query`, formatted as one context
    /// block. An empty string means nothing relevant was found.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<String, AgentError>;
}

#[derive(Debug, Clone)]
struct Passage {
    source: String,
    text: String,
    words: HashSet<String>,
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    passages: Vec<Passage>,
}

impl KeywordIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, source: &str, text: &str) {
        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            self.passages.push(Passage {
                source: source.to_string(),
                text: paragraph.to_string(),
                words: words(paragraph),
            });
        }
    }

    /// Loads every `.txt` and `.md` file directly under `dir`.
    ///
    /// A missing directory yields an empty index.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let dir = dir.as_ref();
        let mut index = Self::empty();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %dir.display(), "knowledge directory not found, retrieval disabled");
                return Ok(index);
            }
            Err(e) => return Err(AgentError::Retrieval(e.to_string())),
        };

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect();
        paths.sort();

        for path in paths {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| AgentError::Retrieval(format!("{}: {}", path.display(), e)))?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            index.add_document(&source, &text);
        }
        info!(path = %dir.display(), passages = index.len(), "knowledge index loaded");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<&Passage> {
        let query_words = words(query);
        if query_words.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, usize, &Passage)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.words.intersection(&query_words).count(), i, p))
            .filter(|(score, _, _)| *score > 0)
            .collect();
        // Highest score first; ties keep document order.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(top_k).map(|(_, _, p)| p).collect()
    }
}

#[async_trait]
impl Retriever for KeywordIndex {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<String, AgentError> {
        if query.trim().is_empty() {
            return Ok(String::new());
        }
        let hits = self.search(query, top_k);
        debug!(hits = hits.len(), "retrieval finished");
        Ok(hits
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[Document {} | {}]\n{}", i + 1, p.source, p.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"))
    }
}
