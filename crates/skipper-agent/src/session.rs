//! Conversation sessions.
//!
//! One [`Session`] per caller identity (call id, phone number, or
//! `sms:<number>`), kept for the life of the process. Histories are
//! append-only. At most one batch of tool invocations is pending per
//! session, and reading it clears it.
//!
//! The map is guarded by a `std::sync::RwLock`. Every acquisition is a short
//! map operation that never spans an `.await`.

use skipper_types::{Channel, Gender, SubjectDomain, ToolInvocation, Turn};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use tracing::info;

/// Tool invocations awaiting execution, with the retrieval context they were
/// generated under.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTools {
    pub invocations: Vec<ToolInvocation>,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub channel: Channel,
    pub history: Vec<Turn>,
    pub pending: Option<PendingTools>,
    pub gender: Option<Gender>,
    pub domain: Option<SubjectDomain>,
    pub caller_phone: Option<String>,
    pub created_at: SystemTime,
}

impl Session {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            history: Vec::new(),
            pending: None,
            gender: None,
            domain: None,
            caller_phone: None,
            created_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Runs `f` on the session, creating a voice session first if none
    /// exists.
    fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.write();
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(Channel::Voice));
        f(session)
    }

    /// Creates the session if it does not exist yet. An existing session
    /// keeps its original channel.
    pub fn init(&self, id: &str, channel: Channel) {
        let mut sessions = self.write();
        if !sessions.contains_key(id) {
            info!(session = id, channel = channel.as_str(), "new session");
            sessions.insert(id.to_string(), Session::new(channel));
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// A snapshot of the whole session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read().get(id).cloned()
    }

    pub fn append(&self, id: &str, turn: Turn) {
        self.update(id, |s| s.history.push(turn));
    }

    /// The session history; empty for unknown sessions.
    pub fn history(&self, id: &str) -> Vec<Turn> {
        self.read()
            .get(id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Stores a pending batch, replacing any previous one.
    pub fn set_pending(&self, id: &str, pending: PendingTools) {
        self.update(id, |s| s.pending = Some(pending));
    }

    /// Returns and clears the pending batch in one step.
    pub fn take_pending(&self, id: &str) -> Option<PendingTools> {
        self.write().get_mut(id).and_then(|s| s.pending.take())
    }

    pub fn gender(&self, id: &str) -> Option<Gender> {
        self.read().get(id).and_then(|s| s.gender)
    }

    pub fn set_gender(&self, id: &str, gender: Gender) {
        self.update(id, |s| s.gender = Some(gender));
    }

    pub fn domain(&self, id: &str) -> Option<SubjectDomain> {
        self.read().get(id).and_then(|s| s.domain)
    }

    pub fn set_domain(&self, id: &str, domain: SubjectDomain) {
        self.update(id, |s| s.domain = Some(domain));
    }

    pub fn caller_phone(&self, id: &str) -> Option<String> {
        self.read().get(id).and_then(|s| s.caller_phone.clone())
    }

    pub fn set_caller_phone(&self, id: &str, phone: &str) {
        self.update(id, |s| s.caller_phone = Some(phone.to_string()));
    }
}
