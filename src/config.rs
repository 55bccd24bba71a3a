//! Maestro configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration for a stock deployment.

use crate::agent::{AgentDescriptor, AgentStatus, MAX_PRIORITY, MIN_PRIORITY, default_agents};
use crate::resources::{OverloadThresholds, default_rate_limits};
use crate::router::{RoutingRuleConfig, default_rules};
use crate::{MaestroError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "MAESTRO_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "maestro.toml";

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Persisted shared-context file
    pub context_path: PathBuf,
    /// Age after which a resource lock may be reclaimed
    pub lock_timeout_secs: u64,
    /// Number of actions kept in the activity log
    pub action_log_capacity: usize,
    /// Period of the background maintenance loop
    pub maintenance_interval_secs: u64,
    /// How long execution waits for a rate-limited service
    pub rate_limit_wait_secs: u64,
    /// Ports probed when the preferred one is taken
    pub port_probe_span: u16,
    /// Agent preferred for coordinating multi-agent plans
    pub coordinator: String,
    /// Category for tasks no routing rule matches
    pub default_category: String,
    /// Calls per minute by external service
    pub rate_limits: BTreeMap<String, u32>,
    pub overload: OverloadThresholds,
    /// Filesystem sampled for disk usage
    pub disk_path: PathBuf,
    /// Agent registry; the stock agents when empty
    pub agents: Vec<AgentDescriptor>,
    /// Routing rules in match order; the stock table when empty
    pub routing: Vec<RoutingRuleConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            context_path: PathBuf::from(".maestro/context.json"),
            lock_timeout_secs: 300,
            action_log_capacity: 100,
            maintenance_interval_secs: 30,
            rate_limit_wait_secs: 10,
            port_probe_span: 100,
            coordinator: "cline".to_string(),
            default_category: "code_generation".to_string(),
            rate_limits: default_rate_limits(),
            overload: OverloadThresholds::default(),
            disk_path: PathBuf::from("/"),
            agents: Vec::new(),
            routing: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Find and load the config, or fall back to defaults
    ///
    /// Checks `explicit`, then `MAESTRO_CONFIG`, then `./maestro.toml`, then
    /// `~/.maestro/config.toml`. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            return Self::from_path(&path);
        }

        match discover() {
            Some(path) => Self::from_path(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.action_log_capacity == 0 {
            return Err(invalid("action_log_capacity", "must be > 0"));
        }
        if self.lock_timeout_secs == 0 {
            return Err(invalid("lock_timeout_secs", "must be > 0"));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(invalid("maintenance_interval_secs", "must be > 0"));
        }
        if self.port_probe_span == 0 {
            return Err(invalid("port_probe_span", "must be > 0"));
        }
        if self.context_path.as_os_str().is_empty() {
            return Err(invalid("context_path", "must not be empty"));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(invalid("agents.name", "must not be empty"));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(invalid("agents.name", &format!("duplicate agent {}", agent.name)));
            }
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&agent.priority) {
                return Err(invalid(
                    "agents.priority",
                    &format!("{} has priority {}, expected 1-10", agent.name, agent.priority),
                ));
            }
            if agent.status == AgentStatus::Unknown {
                return Err(invalid(
                    "agents.status",
                    &format!("{} cannot start as unknown", agent.name),
                ));
            }
        }

        for rule in &self.routing {
            if rule.category.trim().is_empty() {
                return Err(invalid("routing.category", "must not be empty"));
            }
            if rule.patterns.is_empty() {
                return Err(invalid(
                    "routing.patterns",
                    &format!("{} has no patterns", rule.category),
                ));
            }
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_wait_secs)
    }

    /// Configured agents, or the stock registry
    pub fn agent_descriptors(&self) -> Vec<AgentDescriptor> {
        if self.agents.is_empty() {
            default_agents()
        } else {
            self.agents.clone()
        }
    }

    /// Configured routing rules, or the stock table
    pub fn routing_rules(&self) -> Vec<RoutingRuleConfig> {
        if self.routing.is_empty() {
            default_rules()
        } else {
            self.routing.clone()
        }
    }
}

fn invalid(field: &str, reason: &str) -> MaestroError {
    MaestroError::Config(format!("invalid value for {field}: {reason}"))
}

fn discover() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::home_dir()
        .map(|home| home.join(".maestro").join("config.toml"))
        .filter(|path| path.is_file())
}
