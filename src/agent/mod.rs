//! Agent descriptors and the shared registry
//!
//! Describes every named agent the orchestrator can dispatch to.

mod registry;

pub use registry::*;

use serde::{Deserialize, Serialize};

/// How an agent is hosted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Extension running inside an IDE
    IdeExtension,
    /// Assistant built into an IDE
    IdeBuiltin,
    /// Standalone local process
    Standalone,
    /// Networked web service (usually a UI on a local port)
    WebService,
    /// Networked API service
    ApiService,
}

impl AgentKind {
    /// Whether agents of this kind are reached over the network
    pub fn is_networked(self) -> bool {
        matches!(self, AgentKind::WebService | AgentKind::ApiService)
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::IdeExtension => write!(f, "ide_extension"),
            AgentKind::IdeBuiltin => write!(f, "ide_builtin"),
            AgentKind::Standalone => write!(f, "standalone"),
            AgentKind::WebService => write!(f, "web_service"),
            AgentKind::ApiService => write!(f, "api_service"),
        }
    }
}

/// Status of an agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Ready for work
    #[default]
    Idle,
    /// Currently executing a task
    Active,
    /// Occupied outside the orchestrator's control
    Busy,
    /// Last execution failed
    Error,
    /// Never reported
    Unknown,
}

impl AgentStatus {
    /// Whether the router should prefer this agent over busy or failed ones
    pub fn is_available(self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Active)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lowest and highest routing priority
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

fn default_priority() -> u8 {
    5
}

/// Static configuration of a named agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDescriptor {
    /// Unique agent name
    pub name: String,
    /// Hosting kind, selects the adapter
    pub kind: AgentKind,
    /// Capability tags (e.g. `code_generation`, `audio_analysis`)
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Routing priority, 1-10, higher preferred
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Current status
    #[serde(default)]
    pub status: AgentStatus,
    /// Port the agent listens on (networked kinds)
    #[serde(default)]
    pub port: Option<u16>,
    /// Rate-limited external service this agent calls
    #[serde(default)]
    pub service: Option<String>,
    /// Command used by the process adapter
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed before the task text
    #[serde(default)]
    pub args: Vec<String>,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, kind: AgentKind, capabilities: &[&str], priority: u8) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            status: AgentStatus::Idle,
            port: None,
            service: None,
            command: None,
            args: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = Some(command.into());
        self.args = args;
        self
    }

    /// Check for a capability tag
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// The agents of a stock deployment
pub fn default_agents() -> Vec<AgentDescriptor> {
    vec![
        // Coding agents
        AgentDescriptor::new(
            "cline",
            AgentKind::IdeExtension,
            &["code_generation", "file_edit", "terminal", "debug"],
            9,
        ),
        AgentDescriptor::new(
            "cursor_ai",
            AgentKind::IdeBuiltin,
            &["code_generation", "chat", "inline_edit"],
            8,
        ),
        AgentDescriptor::new(
            "github_copilot",
            AgentKind::IdeExtension,
            &["code_completion", "suggestions"],
            7,
        ),
        // Music agents
        AgentDescriptor::new(
            "logic_copilot",
            AgentKind::WebService,
            &["music_chat", "production_tips", "sound_packs"],
            8,
        )
        .with_port(7860)
        .with_service("kimi_k2"),
        AgentDescriptor::new(
            "mixing_engineer",
            AgentKind::WebService,
            &["audio_analysis", "mixing_suggestions", "visualization"],
            9,
        )
        .with_port(7861),
        AgentDescriptor::new(
            "live_ai_assistant",
            AgentKind::Standalone,
            &["voice", "vision", "screen_capture", "realtime"],
            8,
        ),
        AgentDescriptor::new(
            "logic_ai_plugin",
            AgentKind::Standalone,
            &["osc_control", "logic_automation", "vision", "realtime"],
            9,
        ),
        // Documentation agents
        AgentDescriptor::new(
            "docs_agent",
            AgentKind::ApiService,
            &["doc_search", "indexing", "embedding", "rag"],
            7,
        )
        .with_port(8000),
    ]
}
