//! Duplicate-message guard for the messaging webhooks.
//!
//! The messaging transport delivers at least once, so every inbound message
//! id is checked here before any side effect. Ids are namespaced by channel
//! (`whatsapp:SM...`, `sms:SM...`). The set is cleared wholesale by the
//! background task every `dedup_window_secs`.

use skipper_types::Channel;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MessageDeduper {
    seen: Mutex<HashSet<String>>,
}

impl MessageDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Records `message_id` and returns `true` the first time it is seen on
    /// `channel`. Messages without an id are never treated as duplicates.
    pub fn first_delivery(&self, channel: Channel, message_id: Option<&str>) -> bool {
        match message_id.filter(|id| !id.is_empty()) {
            Some(id) => self.lock().insert(format!("{}:{}", channel.as_str(), id)),
            None => true,
        }
    }

    /// Forgets every remembered id and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut seen = self.lock();
        let count = seen.len();
        seen.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
