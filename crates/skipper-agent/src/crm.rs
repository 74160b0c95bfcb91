//! Caller lookup by phone number.

use async_trait::async_trait;
use serde::Deserialize;
use skipper_types::Gender;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub name: String,
    pub gender: Option<Gender>,
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn lookup(&self, phone: &str) -> Option<CustomerRecord>;
}

/// A known customer, matched by the trailing digits of their number.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerEntry {
    pub phone_suffix: String,
    pub name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
}

/// Directory backed by a fixed list of entries from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Vec<CustomerEntry>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<CustomerEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CustomerDirectory for StaticDirectory {
    async fn lookup(&self, phone: &str) -> Option<CustomerRecord> {
        if phone.is_empty() {
            return None;
        }
        let entry = self
            .entries
            .iter()
            .find(|e| !e.phone_suffix.is_empty() && phone.ends_with(&e.phone_suffix))?;
        debug!(suffix = %entry.phone_suffix, "known customer");
        Some(CustomerRecord {
            name: entry.name.clone(),
            gender: entry.gender,
        })
    }
}
