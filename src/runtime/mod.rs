//! Agent adapters - how a routed task actually reaches an agent
//!
//! The orchestrator only needs two things from an agent: run a task, and
//! say whether it is reachable. One adapter serves each agent kind.

mod command;
mod simulated;

pub use command::CommandAdapter;
pub use simulated::SimulatedAdapter;

use crate::agent::{AgentDescriptor, AgentKind};
use crate::{MaestroError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const ALL_KINDS: [AgentKind; 5] = [
    AgentKind::IdeExtension,
    AgentKind::IdeBuiltin,
    AgentKind::Standalone,
    AgentKind::WebService,
    AgentKind::ApiService,
];

#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run `task` on `agent` and return its result
    async fn execute(
        &self,
        agent: &AgentDescriptor,
        task: &str,
        context: Option<&Value>,
    ) -> Result<Value>;

    /// Whether `agent` can take work right now
    fn is_available(&self, agent: &AgentDescriptor) -> bool;
}

/// Adapter lookup keyed by agent kind
#[derive(Clone)]
pub struct AdapterTable {
    adapters: HashMap<AgentKind, Arc<dyn AgentAdapter>>,
}

impl AdapterTable {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Every kind served by [`SimulatedAdapter`]
    pub fn simulated() -> Self {
        Self::uniform(Arc::new(SimulatedAdapter::default()))
    }

    /// Every kind served by the same adapter
    pub fn uniform(adapter: Arc<dyn AgentAdapter>) -> Self {
        let adapters = ALL_KINDS
            .into_iter()
            .map(|kind| (kind, Arc::clone(&adapter)))
            .collect();
        Self { adapters }
    }

    /// Set the adapter for `kind`
    pub fn insert(&mut self, kind: AgentKind, adapter: Arc<dyn AgentAdapter>) -> &mut Self {
        self.adapters.insert(kind, adapter);
        self
    }

    pub fn get(&self, kind: AgentKind) -> Result<Arc<dyn AgentAdapter>> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| MaestroError::Adapter(format!("No adapter for agent kind {kind}")))
    }

    /// Adapter availability for `agent`; false when its kind has no adapter
    pub fn is_available(&self, agent: &AgentDescriptor) -> bool {
        self.adapters
            .get(&agent.kind)
            .is_some_and(|adapter| adapter.is_available(agent))
    }
}

impl Default for AdapterTable {
    /// Standalone agents run as processes; the rest are simulated
    fn default() -> Self {
        let mut table = Self::simulated();
        table.insert(AgentKind::Standalone, Arc::new(CommandAdapter));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_runs_standalone_agents_as_processes() {
        let table = AdapterTable::default();
        assert_eq!(table.get(AgentKind::Standalone).unwrap().name(), "command");
        assert_eq!(table.get(AgentKind::WebService).unwrap().name(), "simulated");
    }

    #[test]
    fn missing_kind_is_an_error() {
        let table = AdapterTable::empty();
        assert!(matches!(
            table.get(AgentKind::IdeBuiltin),
            Err(MaestroError::Adapter(_))
        ));

        let agent = AgentDescriptor::new("cursor_ai", AgentKind::IdeBuiltin, &[], 8);
        assert!(!table.is_available(&agent));
    }
}
