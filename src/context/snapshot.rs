//! On-disk form of the shared context
//!
//! A single JSON object rewritten in full after every mutation.

use crate::Result;
use crate::agent::AgentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Exclusive ownership of a resource by one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLock {
    #[serde(rename = "agent")]
    pub holder: String,
    #[serde(rename = "timestamp")]
    pub acquired_at: DateTime<Utc>,
}

impl ResourceLock {
    /// Age of the lock at `now`; zero if the clock went backwards
    pub fn age_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.acquired_at).to_std().unwrap_or_default()
    }
}

/// Outcome recorded with an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failure,
    InProgress,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Failure => write!(f, "failure"),
            ActionStatus::InProgress => write!(f, "in_progress"),
        }
    }
}

/// Something an agent did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub description: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

/// A fact shared between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub value: Value,
    pub shared_by: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything the shared context persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSnapshot {
    pub files_locked: BTreeMap<String, ResourceLock>,
    pub recent_actions: Vec<ActionEntry>,
    pub goals: Vec<String>,
    pub knowledge_base: BTreeMap<String, KnowledgeEntry>,
    pub agent_states: BTreeMap<String, AgentStatus>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ContextSnapshot {
    /// Read a snapshot; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Write the snapshot atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ContextSnapshot::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_creates_parent_and_uses_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("context.json");

        let mut snapshot = ContextSnapshot::default();
        snapshot.files_locked.insert(
            "/tmp/a.rs".to_string(),
            ResourceLock {
                holder: "cline".to_string(),
                acquired_at: Utc::now(),
            },
        );
        snapshot.save(&path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["files_locked"]["/tmp/a.rs"]["agent"], "cline");
        assert!(raw["files_locked"]["/tmp/a.rs"]["timestamp"].is_string());
        assert!(raw.get("knowledge_base").is_some());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn partial_file_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(&path, r#"{"goals": ["ship it"]}"#).unwrap();

        let snapshot = ContextSnapshot::load(&path).unwrap().unwrap();
        assert_eq!(snapshot.goals, vec!["ship it".to_string()]);
        assert!(snapshot.files_locked.is_empty());
    }
}
