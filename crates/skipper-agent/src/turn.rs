//! Per-call turn state shared between the generation task and the poll
//! webhook.
//!
//! A [`CallTurnTask`] is written by exactly one producer (the generation
//! callbacks) and drained by exactly one consumer (the poll handler). Status,
//! queue and result live behind one mutex so a poll never observes a
//! half-applied update. The interruption flag is a separate atomic so the
//! "fire once" decision is a single compare-and-set.

use skipper_types::ToolInvocation;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Processing,
    Completed,
    Error,
}

/// Final result of a completed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Marker-free response text.
    pub text: String,
    /// Tool invocations the model requested; empty for a plain answer.
    pub tool_calls: Vec<ToolInvocation>,
    /// Retrieval context the turn was generated with.
    pub context: String,
}

impl TurnOutcome {
    pub fn requires_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// What the poll handler should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Generation failed.
    Failed,
    /// Speak these queued fragments, joined with single spaces.
    Narrate(String),
    /// Nothing new yet; pause and poll again.
    Pending,
    /// Generation finished and every fragment has been narrated.
    Finished(TurnOutcome),
}

#[derive(Debug)]
struct TurnInner {
    status: TurnStatus,
    queue: VecDeque<String>,
    result: Option<TurnOutcome>,
}

#[derive(Debug)]
pub struct CallTurnTask {
    /// Conversation the turn belongs to; may differ from the call id.
    session_id: String,
    started_at: Instant,
    interrupted: AtomicBool,
    inner: Mutex<TurnInner>,
}

impl Default for CallTurnTask {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTurnTask {
    pub fn new() -> Self {
        Self::for_session(String::new())
    }

    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Instant::now(),
            interrupted: AtomicBool::new(false),
            inner: Mutex::new(TurnInner {
                status: TurnStatus::Processing,
                queue: VecDeque::new(),
                result: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TurnInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn status(&self) -> TurnStatus {
        self.lock().status
    }

    pub fn push_fragment(&self, fragment: String) {
        self.lock().queue.push_back(fragment);
    }

    pub fn complete(&self, outcome: TurnOutcome) {
        let mut inner = self.lock();
        inner.status = TurnStatus::Completed;
        inner.result = Some(outcome);
    }

    pub fn fail(&self) {
        let mut inner = self.lock();
        inner.status = TurnStatus::Error;
        inner.result = None;
    }

    /// Claims the one-shot interruption.
    ///
    /// The first caller gets `Some(delay)`, where `delay` is what remains of
    /// `min_hold` since the task started (zero once it has passed). Every
    /// later caller gets `None`.
    pub fn claim_interruption(&self, min_hold: Duration) -> Option<Duration> {
        self.interrupted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| min_hold.saturating_sub(self.started_at.elapsed()))
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Decides the next poll step. Narration drains the whole queue.
    pub fn poll(&self) -> PollStep {
        let mut inner = self.lock();
        if inner.status == TurnStatus::Error {
            return PollStep::Failed;
        }
        if !inner.queue.is_empty() {
            let combined: Vec<String> = inner.queue.drain(..).collect();
            return PollStep::Narrate(combined.join(" "));
        }
        match inner.status {
            TurnStatus::Processing => PollStep::Pending,
            _ => PollStep::Finished(inner.result.take().unwrap_or_default()),
        }
    }

    pub fn is_older_than(&self, ttl: Duration) -> bool {
        self.started_at.elapsed() >= ttl
    }
}

/// Process-wide map from call id to its in-flight turn.
#[derive(Debug, Default)]
pub struct TurnStore {
    tasks: Mutex<HashMap<String, Arc<CallTurnTask>>>,
}

impl TurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CallTurnTask>>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Starts a fresh turn for `call_id`, replacing any previous one.
    pub fn start(&self, call_id: &str, session_id: &str) -> Arc<CallTurnTask> {
        let task = Arc::new(CallTurnTask::for_session(session_id));
        self.lock().insert(call_id.to_string(), task.clone());
        task
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallTurnTask>> {
        self.lock().get(call_id).cloned()
    }

    /// Whether `task` is still the turn registered for `call_id`. False once
    /// the turn was replaced by a newer one or removed.
    pub fn is_current(&self, call_id: &str, task: &Arc<CallTurnTask>) -> bool {
        self.lock()
            .get(call_id)
            .is_some_and(|current| Arc::ptr_eq(current, task))
    }

    pub fn remove(&self, call_id: &str) -> Option<Arc<CallTurnTask>> {
        self.lock().remove(call_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops tasks older than `ttl` (orphaned by hang-ups); returns how many.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|_, task| !task.is_older_than(ttl));
        before - tasks.len()
    }
}
