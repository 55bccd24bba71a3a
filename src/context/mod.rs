//! Shared context - state every agent can see
//!
//! Holds exclusive resource locks, a bounded activity log, a key/value
//! knowledge base, outstanding goals and per-agent status. Every mutation
//! rewrites the snapshot on disk so the state survives restarts.
//!
//! Persistence problems are logged and otherwise ignored: the in-memory state
//! stays authoritative for the running process.

mod log;
mod snapshot;

pub use log::RingBuffer;
pub use snapshot::{ActionEntry, ActionStatus, ContextSnapshot, KnowledgeEntry, ResourceLock};

use crate::agent::AgentStatus;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default lock timeout (5 minutes)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of actions kept in the log
pub const DEFAULT_ACTION_CAPACITY: usize = 100;

/// Agent name used for housekeeping entries
pub const SYSTEM_AGENT: &str = "system";

/// Free-form details attached to an action
pub type ActionDetails = BTreeMap<String, Value>;

struct ContextState {
    locks: BTreeMap<String, ResourceLock>,
    actions: RingBuffer<ActionEntry>,
    goals: Vec<String>,
    knowledge: BTreeMap<String, KnowledgeEntry>,
    agent_states: BTreeMap<String, AgentStatus>,
}

impl ContextState {
    fn new(capacity: usize) -> Self {
        Self {
            locks: BTreeMap::new(),
            actions: RingBuffer::new(capacity),
            goals: Vec::new(),
            knowledge: BTreeMap::new(),
            agent_states: BTreeMap::new(),
        }
    }

    fn from_snapshot(snapshot: ContextSnapshot, capacity: usize) -> Self {
        let mut state = Self::new(capacity);
        state.locks = snapshot.files_locked;
        state.actions.extend(snapshot.recent_actions);
        state.goals = snapshot.goals;
        state.knowledge = snapshot.knowledge_base;
        state.agent_states = snapshot.agent_states;
        state
    }

    fn to_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            files_locked: self.locks.clone(),
            recent_actions: self.actions.iter().cloned().collect(),
            goals: self.goals.clone(),
            knowledge_base: self.knowledge.clone(),
            agent_states: self.agent_states.clone(),
            last_updated: Some(Utc::now()),
        }
    }

    fn push_action(
        &mut self,
        agent: &str,
        description: String,
        status: ActionStatus,
        details: ActionDetails,
    ) {
        self.actions.push(ActionEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            description,
            status,
            details,
        });
    }

    fn reap(&mut self, max_age: Duration) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.age_at(now) > max_age)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(lock) = self.locks.remove(key) {
                info!(resource = %key, holder = %lock.holder, "Released expired lock");
                self.push_action(
                    SYSTEM_AGENT,
                    format!("Released expired lock: {} (was held by {})", key, lock.holder),
                    ActionStatus::Success,
                    ActionDetails::new(),
                );
            }
        }

        expired.len()
    }
}

/// Coordination state shared by all agents
pub struct SharedContext {
    /// Snapshot file; `None` keeps the context in memory only
    path: Option<PathBuf>,
    /// Age after which locks are reaped at load time
    lock_timeout: Duration,
    state: Mutex<ContextState>,
}

impl SharedContext {
    /// Open a context backed by `path`, loading the previous snapshot if any
    ///
    /// Locks older than `lock_timeout` are reaped before the context is used.
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration, capacity: usize) -> Self {
        let path = path.as_ref().to_path_buf();

        let mut state = match ContextSnapshot::load(&path) {
            Ok(Some(snapshot)) => {
                info!(path = %path.display(), "Loaded shared context");
                ContextState::from_snapshot(snapshot, capacity)
            }
            Ok(None) => ContextState::new(capacity),
            Err(e) => {
                warn!(path = %path.display(), "Could not load context: {}", e);
                ContextState::new(capacity)
            }
        };

        let reaped = state.reap(lock_timeout);
        let context = Self {
            path: Some(path),
            lock_timeout,
            state: Mutex::new(state),
        };

        if reaped > 0 {
            let state = context.state.lock();
            context.persist(&state);
        }
        context
    }

    /// A context that never touches the disk
    pub fn in_memory(lock_timeout: Duration, capacity: usize) -> Self {
        Self {
            path: None,
            lock_timeout,
            state: Mutex::new(ContextState::new(capacity)),
        }
    }

    /// Snapshot file location, if persistent
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The lock timeout this context was opened with
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    // ------------------------------------------------------------------
    // Resource locks
    // ------------------------------------------------------------------

    /// Acquire an exclusive lock on a resource
    ///
    /// Succeeds when the resource is free, already held by `agent`, or held
    /// by a lock older than `timeout`. Returns false when another agent holds
    /// a live lock; that is normal contention, not an error.
    pub fn acquire_lock(&self, resource: &str, agent: &str, timeout: Duration) -> bool {
        let key = normalize_key(resource);
        let now = Utc::now();
        let mut state = self.state.lock();

        if let Some(existing) = state.locks.get(&key) {
            if existing.holder != agent {
                if existing.age_at(now) <= timeout {
                    debug!(resource = %key, holder = %existing.holder, agent, "Lock contended");
                    return false;
                }
                debug!(resource = %key, holder = %existing.holder, agent, "Reclaiming stale lock");
            }
        }

        state.locks.insert(
            key.clone(),
            ResourceLock {
                holder: agent.to_string(),
                acquired_at: now,
            },
        );
        state.push_action(
            agent,
            format!("Locked resource: {}", key),
            ActionStatus::Success,
            ActionDetails::new(),
        );
        self.persist(&state);
        true
    }

    /// Release a lock held by `agent`; false if it is not the holder
    pub fn release_lock(&self, resource: &str, agent: &str) -> bool {
        let key = normalize_key(resource);
        let mut state = self.state.lock();

        match state.locks.get(&key) {
            Some(lock) if lock.holder == agent => {}
            _ => return false,
        }

        state.locks.remove(&key);
        state.push_action(
            agent,
            format!("Released resource: {}", key),
            ActionStatus::Success,
            ActionDetails::new(),
        );
        self.persist(&state);
        true
    }

    /// Current holder of a resource lock
    pub fn lock_holder(&self, resource: &str) -> Option<String> {
        let key = normalize_key(resource);
        self.state.lock().locks.get(&key).map(|l| l.holder.clone())
    }

    /// All current locks keyed by normalized resource
    pub fn locks(&self) -> BTreeMap<String, ResourceLock> {
        self.state.lock().locks.clone()
    }

    /// Keys of all locked resources
    pub fn locked_resources(&self) -> Vec<String> {
        self.state.lock().locks.keys().cloned().collect()
    }

    /// Remove every lock older than `max_age`; returns how many were reaped
    pub fn reap_stale_locks(&self, max_age: Duration) -> usize {
        let mut state = self.state.lock();
        let reaped = state.reap(max_age);
        if reaped > 0 {
            self.persist(&state);
        }
        reaped
    }

    // ------------------------------------------------------------------
    // Activity log
    // ------------------------------------------------------------------

    /// Append an entry to the activity log
    pub fn record_action(
        &self,
        agent: &str,
        description: impl Into<String>,
        status: ActionStatus,
        details: ActionDetails,
    ) {
        let mut state = self.state.lock();
        state.push_action(agent, description.into(), status, details);
        self.persist(&state);
    }

    /// The last `limit` actions, optionally for one agent, oldest first
    pub fn recent_actions(&self, agent: Option<&str>, limit: usize) -> Vec<ActionEntry> {
        let state = self.state.lock();
        let matching: Vec<&ActionEntry> = state
            .actions
            .iter()
            .filter(|a| agent.is_none_or(|name| a.agent == name))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    // ------------------------------------------------------------------
    // Knowledge base
    // ------------------------------------------------------------------

    /// Publish a fact under `key`, replacing any previous value
    pub fn share_knowledge(&self, key: &str, value: Value, agent: &str) {
        let mut state = self.state.lock();
        state.knowledge.insert(
            key.to_string(),
            KnowledgeEntry {
                value,
                shared_by: agent.to_string(),
                timestamp: Utc::now(),
            },
        );
        state.push_action(
            agent,
            format!("Shared knowledge: {}", key),
            ActionStatus::Success,
            ActionDetails::new(),
        );
        self.persist(&state);
    }

    /// Value stored under `key`
    pub fn knowledge(&self, key: &str) -> Option<Value> {
        self.state.lock().knowledge.get(key).map(|k| k.value.clone())
    }

    /// Value plus who shared it and when
    pub fn knowledge_entry(&self, key: &str) -> Option<KnowledgeEntry> {
        self.state.lock().knowledge.get(key).cloned()
    }

    // ------------------------------------------------------------------
    // Goals
    // ------------------------------------------------------------------

    /// Add a goal; duplicates are ignored
    pub fn add_goal(&self, goal: &str) {
        let mut state = self.state.lock();
        if state.goals.iter().any(|g| g == goal) {
            return;
        }
        state.goals.push(goal.to_string());
        self.persist(&state);
    }

    /// Remove a goal; no-op if absent
    pub fn complete_goal(&self, goal: &str) {
        let mut state = self.state.lock();
        let before = state.goals.len();
        state.goals.retain(|g| g != goal);
        if state.goals.len() != before {
            self.persist(&state);
        }
    }

    /// Outstanding goals in insertion order
    pub fn goals(&self) -> Vec<String> {
        self.state.lock().goals.clone()
    }

    // ------------------------------------------------------------------
    // Agent state
    // ------------------------------------------------------------------

    pub fn set_agent_state(&self, agent: &str, status: AgentStatus) {
        let mut state = self.state.lock();
        state.agent_states.insert(agent.to_string(), status);
        self.persist(&state);
    }

    /// Last reported status, `Unknown` if never set
    pub fn agent_state(&self, agent: &str) -> AgentStatus {
        self.state
            .lock()
            .agent_states
            .get(agent)
            .copied()
            .unwrap_or(AgentStatus::Unknown)
    }

    pub fn agent_states(&self) -> BTreeMap<String, AgentStatus> {
        self.state.lock().agent_states.clone()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Point-in-time copy of the whole context
    pub fn snapshot(&self) -> ContextSnapshot {
        self.state.lock().to_snapshot()
    }

    fn persist(&self, state: &ContextState) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = state.to_snapshot().save(path) {
            warn!(path = %path.display(), "Could not save context: {}", e);
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_lock(&self, resource: &str, by: Duration) {
        let key = normalize_key(resource);
        let mut state = self.state.lock();
        if let Some(lock) = state.locks.get_mut(&key) {
            lock.acquired_at -= chrono::Duration::from_std(by).unwrap();
        }
        self.persist(&state);
    }
}

/// Normalize a resource key to an absolute path
///
/// Keys that cannot be made absolute are used as given.
pub fn normalize_key(resource: &str) -> String {
    match std::path::absolute(resource) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(_) => resource.to_string(),
    }
}
