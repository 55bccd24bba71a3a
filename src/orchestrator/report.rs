//! Results and status reports returned by the orchestrator

use crate::agent::{AgentKind, AgentStatus};
use crate::context::ActionEntry;
use crate::resources::ResourceSummary;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Outcome of running one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Agent the task went to; `None` when routing failed
    pub agent: Option<String>,
    pub result: Option<Value>,
    pub message: String,
}

impl ExecutionResult {
    pub(crate) fn success(agent: &str, result: Value) -> Self {
        Self {
            status: ExecutionStatus::Success,
            agent: Some(agent.to_string()),
            result: Some(result),
            message: format!("Task completed by {agent}"),
        }
    }

    pub(crate) fn failure(agent: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            agent: agent.map(str::to_string),
            result: None,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Outcome of a multi-step plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexExecutionResult {
    pub status: ExecutionStatus,
    pub coordinator: Option<String>,
    pub agents: Vec<String>,
    /// Results of the steps that ran, in plan order
    pub results: Vec<ExecutionResult>,
    pub message: String,
}

impl ComplexExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// One agent as seen by `status`
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub kind: AgentKind,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub priority: u8,
    pub port: Option<u16>,
    /// Whether the agent's adapter reports it reachable
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextReport {
    pub locked_resources: Vec<String>,
    pub goals: Vec<String>,
    pub recent_actions: Vec<ActionEntry>,
}

/// Dashboard view over agents, resources and shared context
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub agents: BTreeMap<String, AgentReport>,
    pub resources: ResourceSummary,
    pub context: ContextReport,
}

/// What a maintenance pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub reaped_locks: usize,
    pub overloaded: bool,
}
