//! Data-driven task classification rules

use crate::Result;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A routing rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingRuleConfig {
    /// Category name (e.g. `code_generation`)
    pub category: String,
    /// Case-insensitive patterns; any match classifies the task
    pub patterns: Vec<String>,
    /// Agents best suited for the category
    #[serde(default)]
    pub preferred: Vec<String>,
    /// Agents that can handle the category
    #[serde(default)]
    pub fallback: Vec<String>,
    /// Capability tags that also qualify an agent; defaults to the category
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl RoutingRuleConfig {
    fn new(category: &str, patterns: &[&str], preferred: &[&str], fallback: &[&str]) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            category: category.to_string(),
            patterns: owned(patterns),
            preferred: owned(preferred),
            fallback: owned(fallback),
            capabilities: Vec::new(),
        }
    }

    fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A compiled routing rule
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub category: String,
    pub patterns: Vec<Regex>,
    pub preferred: Vec<String>,
    pub fallback: Vec<String>,
    pub capabilities: Vec<String>,
}

impl RoutingRule {
    pub fn compile(config: &RoutingRuleConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let capabilities = if config.capabilities.is_empty() {
            vec![config.category.clone()]
        } else {
            config.capabilities.clone()
        };

        Ok(Self {
            category: config.category.clone(),
            patterns,
            preferred: config.preferred.clone(),
            fallback: config.fallback.clone(),
            capabilities,
        })
    }

    pub fn matches(&self, task: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(task))
    }

    pub fn is_preferred(&self, agent: &str) -> bool {
        self.preferred.iter().any(|a| a == agent)
    }

    pub fn is_fallback(&self, agent: &str) -> bool {
        self.fallback.iter().any(|a| a == agent)
    }
}

/// Compile a rule table, keeping its order
pub fn compile_rules(configs: &[RoutingRuleConfig]) -> Result<Vec<RoutingRule>> {
    configs.iter().map(RoutingRule::compile).collect()
}

/// The stock rule table, checked in order
pub fn default_rules() -> Vec<RoutingRuleConfig> {
    vec![
        RoutingRuleConfig::new(
            "code_generation",
            &[
                r"create.*function",
                r"write.*code",
                r"implement.*",
                r"generate.*script",
                r"build.*app",
            ],
            &["cline", "cursor_ai"],
            &["github_copilot"],
        ),
        RoutingRuleConfig::new(
            "code_refactoring",
            &[r"refactor", r"reorganize.*code", r"migrate.*", r"restructure"],
            &["cline"],
            &["cursor_ai"],
        )
        .with_capabilities(&["code_refactoring", "code_generation", "file_edit"]),
        RoutingRuleConfig::new(
            "audio_analysis",
            &[r"analyze.*audio", r"mix.*track", r"check.*levels", r"eq.*recommendation"],
            &["mixing_engineer"],
            &[],
        ),
        RoutingRuleConfig::new(
            "music_production",
            &[
                r"(how|what|why).*logic pro",
                r"production.*tip",
                r"sound.*pack",
                r"beat.*making",
            ],
            &["logic_copilot"],
            &["mixing_engineer"],
        )
        .with_capabilities(&["music_chat", "production_tips"]),
        RoutingRuleConfig::new(
            "documentation_search",
            &[r"search.*docs", r"find.*documentation", r"lookup.*api", r"how to.*in"],
            &["docs_agent"],
            &["cursor_ai"],
        )
        .with_capabilities(&["doc_search"]),
        RoutingRuleConfig::new(
            "realtime_assistance",
            &[r"watch.*screen", r"voice.*command", r"real.*time", r"live.*assist"],
            &["live_ai_assistant", "logic_ai_plugin"],
            &[],
        )
        .with_capabilities(&["realtime"]),
    ]
}
