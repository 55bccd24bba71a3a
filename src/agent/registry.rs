//! Agent registry - the set of agents the router may pick from

use super::{AgentDescriptor, AgentStatus, MAX_PRIORITY, MIN_PRIORITY};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared registry of agent descriptors
///
/// Cloning yields another handle to the same registry, so the router and the
/// orchestrator always observe the same agents and statuses.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<BTreeMap<String, AgentDescriptor>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors; later duplicates replace earlier ones
    pub fn from_agents(agents: impl IntoIterator<Item = AgentDescriptor>) -> Self {
        let registry = Self::new();
        for agent in agents {
            registry.register(agent);
        }
        registry
    }

    /// Add or replace an agent
    pub fn register(&self, mut agent: AgentDescriptor) {
        agent.priority = agent.priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        self.agents.write().insert(agent.name.clone(), agent);
    }

    /// Remove an agent
    pub fn unregister(&self, name: &str) -> Option<AgentDescriptor> {
        self.agents.write().remove(name)
    }

    /// Get a copy of an agent's descriptor
    pub fn get(&self, name: &str) -> Option<AgentDescriptor> {
        self.agents.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.read().contains_key(name)
    }

    /// All agents, ordered by name
    pub fn list(&self) -> Vec<AgentDescriptor> {
        self.agents.read().values().cloned().collect()
    }

    /// All agent names, ordered
    pub fn names(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    /// Update an agent's status; returns false for unknown agents
    pub fn set_status(&self, name: &str, status: AgentStatus) -> bool {
        match self.agents.write().get_mut(name) {
            Some(agent) => {
                agent.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}
