//! Per-conversation state: learned facts, preferences and turn history.
//!
//! A [`SessionContext`] is owned by exactly one conversation. The
//! [`SessionManager`] hands each one out behind its own mutex, so a session
//! processes one utterance at a time while different sessions never contend.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Default number of turns kept per session.
pub const DEFAULT_MAX_HISTORY: usize = 100;

// ── SessionId ────────────────────────────────────────────────────────────

/// Opaque session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SessionId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

// ── Turn ─────────────────────────────────────────────────────────────────

/// One exchange in the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub utterance: String,
    pub response: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

// ── SessionContext ───────────────────────────────────────────────────────

/// Everything one conversation has taught the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    facts: BTreeMap<String, String>,
    preferences: BTreeSet<String>,
    history: VecDeque<Turn>,
    max_history: usize,
    /// Set under the lock when the manager closes the session.
    #[serde(skip)]
    closed: bool,
}

impl SessionContext {
    pub fn new(session_id: SessionId, max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            session_id,
            facts: BTreeMap::new(),
            preferences: BTreeSet::new(),
            history: VecDeque::with_capacity(max_history.min(16)),
            max_history,
            closed: false,
        }
    }

    /// Look up a learned fact by name (case-insensitive).
    pub fn fact(&self, name: &str) -> Option<&str> {
        self.facts.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Bind a fact, replacing any previous value. Returns the old value.
    pub fn set_fact(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.facts.insert(name.to_lowercase(), value.into())
    }

    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }

    /// Record a preference. Returns `false` if it was already recorded.
    pub fn add_preference(&mut self, value: impl Into<String>) -> bool {
        self.preferences.insert(value.into())
    }

    pub fn preferences(&self) -> &BTreeSet<String> {
        &self.preferences
    }

    /// Append a turn, evicting the oldest once the history is full.
    pub fn record_turn(&mut self, utterance: impl Into<String>, response: impl Into<String>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(Turn {
            utterance: utterance.into(),
            response: response.into(),
            timestamp,
        });
    }

    pub fn history(&self) -> &VecDeque<Turn> {
        &self.history
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Human-readable summary of what was learned.
    pub fn summary(&self) -> String {
        render_summary(&self.facts, &self.preferences)
    }
}

/// Render a learned-state summary from facts and preferences.
pub fn render_summary(facts: &BTreeMap<String, String>, preferences: &BTreeSet<String>) -> String {
    if facts.is_empty() && preferences.is_empty() {
        return "I haven't learned anything about you yet.".to_string();
    }

    let mut out = String::from("In this session I've learned:");
    for (name, value) in facts {
        out.push_str(&format!(" {name}: {value};"));
    }
    if !preferences.is_empty() {
        let prefs: Vec<&str> = preferences.iter().map(String::as_str).collect();
        out.push_str(&format!(" you prefer {};", prefs.join(", ")));
    }
    out.push_str(&format!(
        " {} fact(s), {} preference(s).",
        facts.len(),
        preferences.len()
    ));
    out
}

// ── SessionManager ───────────────────────────────────────────────────────

/// Registry of open sessions.
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Mutex<SessionContext>>>,
    next_id: AtomicU64,
    max_history: usize,
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_history,
        }
    }

    pub fn open(&self) -> SessionId {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = SessionId::new(raw).expect("session id allocator starts at 1");
        self.sessions.insert(
            id,
            Arc::new(Mutex::new(SessionContext::new(id, self.max_history))),
        );
        tracing::debug!(session = %id, "opened session");
        id
    }

    /// Handle to a session's context.
    pub fn get(&self, id: SessionId) -> Result<Arc<Mutex<SessionContext>>, SessionError> {
        self.sessions
            .get(&id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(SessionError::UnknownSession { id: id.get() })
    }

    /// Run `f` with the session locked.
    ///
    /// Fails with `UnknownSession` if the session was closed while the
    /// caller waited for the lock.
    pub fn with_session<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut SessionContext) -> R,
    ) -> Result<R, SessionError> {
        let session = self.get(id)?;
        let mut ctx = session.lock().expect("session lock poisoned");
        if ctx.closed {
            return Err(SessionError::UnknownSession { id: id.get() });
        }
        Ok(f(&mut ctx))
    }

    /// A copy of the session's current state.
    pub fn snapshot(&self, id: SessionId) -> Result<SessionContext, SessionError> {
        self.with_session(id, |ctx| ctx.clone())
    }

    /// Close a session and return its final state.
    ///
    /// The session is marked closed and unregistered under its own lock, so
    /// a turn in flight either lands before the final state is taken or is
    /// refused.
    pub fn close(&self, id: SessionId) -> Result<SessionContext, SessionError> {
        let ctx = self.with_session(id, |ctx| {
            ctx.closed = true;
            self.sessions.remove(&id);
            let mut last = ctx.clone();
            last.closed = false;
            last
        })?;
        tracing::debug!(session = %id, "closed session");
        Ok(ctx)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(max: usize) -> SessionContext {
        SessionContext::new(SessionId::new(1).unwrap(), max)
    }

    #[test]
    fn facts_are_case_insensitive_and_overwrite() {
        let mut s = ctx(10);
        assert_eq!(s.set_fact("Name", "Alice"), None);
        assert_eq!(s.fact("name"), Some("Alice"));
        assert_eq!(s.set_fact("NAME", "Bob").as_deref(), Some("Alice"));
        assert_eq!(s.fact("Name"), Some("Bob"));
    }

    #[test]
    fn preferences_deduplicate() {
        let mut s = ctx(10);
        assert!(s.add_preference("technical explanations"));
        assert!(!s.add_preference("technical explanations"));
        assert_eq!(s.preferences().len(), 1);
    }

    #[test]
    fn closed_session_refuses_late_turns() {
        let manager = SessionManager::new(10);
        let id = manager.open();
        let handle = manager.get(id).unwrap();
        manager
            .with_session(id, |ctx| ctx.record_turn("hello", "hi"))
            .unwrap();

        let last = manager.close(id).unwrap();
        assert_eq!(last.history().len(), 1);
        assert!(manager.is_empty());

        // A caller that fetched the handle before the close sees it as closed.
        assert!(handle.lock().unwrap().closed);
        assert!(matches!(
            manager.with_session(id, |ctx| ctx.record_turn("late", "lost")),
            Err(SessionError::UnknownSession { .. })
        ));
        assert!(matches!(
            manager.close(id),
            Err(SessionError::UnknownSession { .. })
        ));
    }

    #[test]
    fn close_waits_for_a_turn_in_flight() {
        let manager = Arc::new(SessionManager::new(10));
        let id = manager.open();
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let worker = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                manager.with_session(id, |ctx| {
                    started_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    ctx.record_turn("slow", "done");
                })
            })
        };

        started_rx.recv().unwrap();
        let last = manager.close(id).unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(last.history().len(), 1);
        assert_eq!(last.history()[0].utterance, "slow");
    }

    #[test]
    fn history_is_bounded() {
        let mut s = ctx(3);
        for i in 0..5 {
            s.record_turn(format!("u{i}"), format!("r{i}"));
        }
        assert_eq!(s.history().len(), 3);
        assert_eq!(s.history()[0].utterance, "u2");
        assert_eq!(s.history()[2].response, "r4");
    }

    #[test]
    fn summary_lists_everything() {
        let mut s = ctx(10);
        assert!(s.summary().contains("haven't learned"));
        s.set_fact("name", "Alice");
        s.set_fact("location", "Seattle");
        s.add_preference("technical explanations");
        let summary = s.summary();
        assert!(summary.contains("name: Alice"));
        assert!(summary.contains("location: Seattle"));
        assert!(summary.contains("you prefer technical explanations"));
        assert!(summary.contains("2 fact(s), 1 preference(s)"));
    }

    #[test]
    fn manager_lifecycle() {
        let mgr = SessionManager::new(DEFAULT_MAX_HISTORY);
        let a = mgr.open();
        let b = mgr.open();
        assert_ne!(a, b);
        assert_eq!(mgr.len(), 2);

        mgr.get(a).unwrap().lock().unwrap().set_fact("name", "Alice");
        assert_eq!(mgr.snapshot(a).unwrap().fact("name"), Some("Alice"));
        assert_eq!(mgr.snapshot(b).unwrap().fact("name"), None);

        let closed = mgr.close(a).unwrap();
        assert_eq!(closed.fact("name"), Some("Alice"));
        assert!(matches!(
            mgr.get(a),
            Err(SessionError::UnknownSession { .. })
        ));
        assert!(mgr.close(a).is_err());
    }
}
