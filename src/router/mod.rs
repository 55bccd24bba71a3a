//! Task router - matches free-text tasks to agents
//!
//! A task is classified by the first rule whose pattern matches, candidates
//! are gathered for that category, and the highest-priority available
//! candidate wins.

mod decompose;
mod rules;

pub use decompose::decompose;
pub use rules::{RoutingRule, RoutingRuleConfig, compile_rules, default_rules};

use crate::Result;
use crate::agent::{AgentDescriptor, AgentKind, AgentRegistry, AgentStatus};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

/// Category used when no rule matches
pub const DEFAULT_CATEGORY: &str = "code_generation";

/// Agent preferred for coordinating multi-agent plans
pub const DEFAULT_COORDINATOR: &str = "cline";

const CONFIDENCE_PREFERRED: f64 = 0.9;
const CONFIDENCE_FALLBACK: f64 = 0.6;
const CONFIDENCE_OTHER: f64 = 0.5;
const HIGH_PRIORITY: u8 = 8;

/// Outcome of routing a single task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    pub category: String,
    /// Selected agent; `None` when nothing could take the task
    pub agent: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<String>,
}

/// One step of a multi-agent plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub agent: String,
    pub task: String,
    /// 1-based position of the subtask in the decomposition
    pub order: usize,
}

/// Plan for a compound task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexRoute {
    pub coordinator: Option<String>,
    /// Distinct agents in order of first use
    pub agents: Vec<String>,
    pub plan: Vec<PlanStep>,
}

/// Routes tasks against a shared agent registry
pub struct TaskRouter {
    registry: AgentRegistry,
    rules: Vec<RoutingRule>,
    default_category: String,
    coordinator: String,
}

impl TaskRouter {
    pub fn new(
        registry: AgentRegistry,
        rules: &[RoutingRuleConfig],
        default_category: impl Into<String>,
        coordinator: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            rules: compile_rules(rules)?,
            default_category: default_category.into(),
            coordinator: coordinator.into(),
        })
    }

    /// Router with the stock rule table
    pub fn with_default_rules(registry: AgentRegistry) -> Result<Self> {
        Self::new(registry, &default_rules(), DEFAULT_CATEGORY, DEFAULT_COORDINATOR)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// Category for a task: first matching rule, else the default
    pub fn classify(&self, task: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(task))
            .map(|rule| rule.category.as_str())
            .unwrap_or(&self.default_category)
    }

    /// Pick an agent for `task`
    ///
    /// `context` is accepted for callers that carry it; routing is decided
    /// by the task text and the registry alone.
    pub fn route(&self, task: &str, _context: Option<&Value>) -> RouteDecision {
        let category = self.classify(task).to_string();
        let rule = self.rule(&category);
        let agents: BTreeMap<String, AgentDescriptor> = self
            .registry
            .list()
            .into_iter()
            .map(|a| (a.name.clone(), a))
            .collect();

        let candidates = candidates(rule, &category, &agents);
        let Some(selected) = select_best(&candidates, &agents) else {
            debug!(%category, "No agent available");
            return RouteDecision {
                reasoning: format!("No agents available for task type: {category}"),
                category,
                agent: None,
                confidence: 0.0,
                alternatives: Vec::new(),
            };
        };

        let descriptor = &agents[&selected];
        let confidence = match rule {
            Some(r) if r.is_preferred(&selected) => CONFIDENCE_PREFERRED,
            Some(r) if r.is_fallback(&selected) => CONFIDENCE_FALLBACK,
            _ => CONFIDENCE_OTHER,
        };
        let reasoning = explain(rule, &category, descriptor);
        let alternatives = candidates.into_iter().filter(|a| *a != selected).collect();

        debug!(%category, agent = %selected, confidence, "Routed task");
        RouteDecision {
            category,
            agent: Some(selected),
            confidence,
            reasoning,
            alternatives,
        }
    }

    /// Plan a compound task across agents
    ///
    /// Without explicit `subtasks` the task is split with [`decompose`].
    /// Subtasks no agent can take are left out of the plan.
    pub fn route_complex(&self, task: &str, subtasks: Option<Vec<String>>) -> ComplexRoute {
        let subtasks = match subtasks {
            Some(list) if !list.is_empty() => list,
            _ => decompose(task),
        };

        let mut plan = Vec::new();
        let mut agents: Vec<String> = Vec::new();
        for (index, subtask) in subtasks.into_iter().enumerate() {
            let Some(agent) = self.route(&subtask, None).agent else {
                debug!(%subtask, "Skipping unroutable subtask");
                continue;
            };
            if !agents.contains(&agent) {
                agents.push(agent.clone());
            }
            plan.push(PlanStep {
                agent,
                task: subtask,
                order: index + 1,
            });
        }

        ComplexRoute {
            coordinator: self.select_coordinator(&agents),
            agents,
            plan,
        }
    }

    /// Register an agent known only by capabilities
    ///
    /// Such agents are treated as API services.
    pub fn register_agent(&self, name: &str, capabilities: &[&str], priority: u8) {
        self.registry.register(AgentDescriptor::new(
            name,
            AgentKind::ApiService,
            capabilities,
            priority,
        ));
    }

    pub fn unregister_agent(&self, name: &str) -> bool {
        self.registry.unregister(name).is_some()
    }

    /// Affects later routing only
    pub fn update_agent_status(&self, name: &str, status: AgentStatus) -> bool {
        self.registry.set_status(name, status)
    }

    fn rule(&self, category: &str) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.category == category)
    }

    fn select_coordinator(&self, agents: &[String]) -> Option<String> {
        if agents.iter().any(|a| *a == self.coordinator) {
            return Some(self.coordinator.clone());
        }
        agents
            .iter()
            .filter_map(|name| self.registry.get(name))
            .fold(None::<AgentDescriptor>, |best, agent| match best {
                Some(b) if b.priority >= agent.priority => Some(b),
                _ => Some(agent),
            })
            .map(|a| a.name)
    }
}

/// Registered preferred and fallback agents
///
/// Capability matches are only considered when the rule names no
/// registered agent; every agent is the last resort.
fn candidates(
    rule: Option<&RoutingRule>,
    category: &str,
    agents: &BTreeMap<String, AgentDescriptor>,
) -> Vec<String> {
    let mut list: Vec<String> = Vec::new();
    let mut push = |name: &String| {
        if agents.contains_key(name) && !list.contains(name) {
            list.push(name.clone());
        }
    };

    let fallback_capability = [category.to_string()];
    let capabilities = match rule {
        Some(rule) => {
            rule.preferred.iter().for_each(&mut push);
            rule.fallback.iter().for_each(&mut push);
            rule.capabilities.as_slice()
        }
        None => fallback_capability.as_slice(),
    };

    if list.is_empty() {
        list.extend(
            agents
                .values()
                .filter(|agent| capabilities.iter().any(|c| agent.has_capability(c)))
                .map(|agent| agent.name.clone()),
        );
    }

    if list.is_empty() {
        list.extend(agents.keys().cloned());
    }
    list
}

/// Highest priority among available candidates, or among all when none are
fn select_best(candidates: &[String], agents: &BTreeMap<String, AgentDescriptor>) -> Option<String> {
    let mut pool: Vec<&AgentDescriptor> = candidates
        .iter()
        .filter_map(|name| agents.get(name))
        .filter(|a| a.status.is_available())
        .collect();
    if pool.is_empty() {
        pool = candidates.iter().filter_map(|name| agents.get(name)).collect();
    }

    // stable: equal priorities keep candidate order
    pool.sort_by_key(|a| Reverse(a.priority));
    pool.first().map(|a| a.name.clone())
}

fn explain(rule: Option<&RoutingRule>, category: &str, agent: &AgentDescriptor) -> String {
    let mut reasons = Vec::new();

    match rule {
        Some(r) if r.is_preferred(&agent.name) => reasons.push(format!("Best suited for {category}")),
        Some(r) if r.is_fallback(&agent.name) => reasons.push(format!("Can handle {category}")),
        Some(r) if r.capabilities.iter().any(|c| agent.has_capability(c)) => {
            reasons.push(format!("Has a capability for {category}"))
        }
        None if agent.has_capability(category) => {
            reasons.push(format!("Has a capability for {category}"))
        }
        _ => {}
    }
    if agent.priority >= HIGH_PRIORITY {
        reasons.push("High priority agent".to_string());
    }
    if agent.status == AgentStatus::Idle {
        reasons.push("Currently available".to_string());
    }

    if reasons.is_empty() {
        "Selected by default".to_string()
    } else {
        reasons.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::default_agents;

    fn stock_router() -> TaskRouter {
        TaskRouter::with_default_rules(AgentRegistry::from_agents(default_agents())).unwrap()
    }

    fn scenario_router() -> TaskRouter {
        let router = TaskRouter::with_default_rules(AgentRegistry::new()).unwrap();
        router.register_agent("writer", &["code_generation"], 9);
        router.register_agent("analyzer", &["audio_analysis"], 8);
        router
    }

    #[test]
    fn classifies_by_first_matching_rule() {
        let router = stock_router();
        assert_eq!(router.classify("Create a function that parses dates"), "code_generation");
        assert_eq!(router.classify("refactor the billing module"), "code_refactoring");
        assert_eq!(router.classify("mix this track"), "audio_analysis");
        assert_eq!(router.classify("What is new in Logic Pro 11"), "music_production");
        assert_eq!(router.classify("search the docs for tokio"), "documentation_search");
        assert_eq!(router.classify("take a voice command"), "realtime_assistance");
        assert_eq!(router.classify("hello there"), DEFAULT_CATEGORY);
    }

    #[test]
    fn preferred_agent_wins_with_high_confidence() {
        let decision = stock_router().route("write code for a REST client", None);
        assert_eq!(decision.agent.as_deref(), Some("cline"));
        assert_eq!(decision.confidence, 0.9);
        assert_eq!(
            decision.reasoning,
            "Best suited for code_generation; High priority agent; Currently available"
        );
        assert_eq!(decision.alternatives, ["cursor_ai", "github_copilot"]);
    }

    #[test]
    fn busy_agents_are_passed_over() {
        let router = stock_router();
        router.update_agent_status("cline", AgentStatus::Busy);

        let decision = router.route("write code for a REST client", None);
        assert_eq!(decision.agent.as_deref(), Some("cursor_ai"));
        assert!(decision.alternatives.contains(&"cline".to_string()));
    }

    #[test]
    fn unavailable_candidates_still_route() {
        let router = stock_router();
        router.update_agent_status("mixing_engineer", AgentStatus::Error);

        let decision = router.route("analyze audio stems", None);
        assert_eq!(decision.agent.as_deref(), Some("mixing_engineer"));
        assert_eq!(decision.reasoning, "Best suited for audio_analysis; High priority agent");
    }

    #[test]
    fn named_agents_outrank_capability_matches() {
        let router = stock_router();
        router.register_agent("mixer", &["audio_analysis"], 10);

        let decision = router.route("analyze audio stems", None);
        assert_eq!(decision.agent.as_deref(), Some("mixing_engineer"));
        assert_eq!(decision.confidence, 0.9);
        assert!(!decision.alternatives.contains(&"mixer".to_string()));
    }

    #[test]
    fn fallback_agent_gets_lower_confidence() {
        let router = stock_router();
        router.unregister_agent("docs_agent");

        let decision = router.route("find documentation for serde", None);
        assert_eq!(decision.agent.as_deref(), Some("cursor_ai"));
        assert_eq!(decision.confidence, 0.6);
        assert!(decision.reasoning.starts_with("Can handle documentation_search"));
    }

    #[test]
    fn routes_by_capability() {
        let router = scenario_router();

        let audio = router.route("analyze this audio track and check levels", None);
        assert_eq!(audio.agent.as_deref(), Some("analyzer"));
        assert_eq!(audio.confidence, 0.5);

        let code = router.route("create a function to sort a list", None);
        assert_eq!(code.agent.as_deref(), Some("writer"));
    }

    #[test]
    fn unmatched_task_uses_default_category() {
        let router = scenario_router();
        let decision = router.route("tell me a joke", None);
        assert_eq!(decision.category, DEFAULT_CATEGORY);
        assert_eq!(decision.agent.as_deref(), Some("writer"));
    }

    #[test]
    fn any_agent_beats_no_agent() {
        let router = TaskRouter::with_default_rules(AgentRegistry::new()).unwrap();
        router.register_agent("generalist", &["chat"], 3);

        let decision = router.route("watch my screen", None);
        assert_eq!(decision.agent.as_deref(), Some("generalist"));
        assert_eq!(decision.reasoning, "Currently available");
    }

    #[test]
    fn empty_registry_cannot_route() {
        let router = TaskRouter::with_default_rules(AgentRegistry::new()).unwrap();
        let decision = router.route("write code", None);
        assert_eq!(decision.agent, None);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.alternatives.is_empty());
    }

    #[test]
    fn routing_is_deterministic() {
        let router = stock_router();
        let first = router.route("implement a cache", None);
        for _ in 0..10 {
            assert_eq!(router.route("implement a cache", None), first);
        }
    }

    #[test]
    fn registry_changes_are_visible() {
        let router = scenario_router();
        router.register_agent("mixer", &["audio_analysis"], 10);
        assert_eq!(
            router.route("analyze audio", None).agent.as_deref(),
            Some("mixer")
        );
        assert!(router.unregister_agent("mixer"));
        assert_eq!(
            router.route("analyze audio", None).agent.as_deref(),
            Some("analyzer")
        );
        assert!(!router.unregister_agent("mixer"));
    }

    #[test]
    fn complex_task_plans_in_order() {
        let route = scenario_router().route_complex("refactor module A and analyze audio output", None);
        assert_eq!(route.agents, ["writer", "analyzer"]);
        assert_eq!(route.coordinator.as_deref(), Some("writer"));
        assert_eq!(
            route.plan,
            [
                PlanStep {
                    agent: "writer".into(),
                    task: "refactor module A".into(),
                    order: 1
                },
                PlanStep {
                    agent: "analyzer".into(),
                    task: "analyze audio output".into(),
                    order: 2
                },
            ]
        );
    }

    #[test]
    fn coordinator_prefers_designated_agent() {
        let route = stock_router().route_complex(
            "mix the track and refactor the exporter",
            None,
        );
        assert_eq!(route.agents, ["mixing_engineer", "cline"]);
        assert_eq!(route.coordinator.as_deref(), Some("cline"));
    }

    #[test]
    fn explicit_subtasks_skip_decomposition() {
        let route = scenario_router().route_complex(
            "ignored and also ignored",
            Some(vec!["check levels on the master".into()]),
        );
        assert_eq!(route.plan.len(), 1);
        assert_eq!(route.plan[0].agent, "analyzer");
    }

    #[test]
    fn unroutable_subtasks_are_skipped() {
        let router = TaskRouter::with_default_rules(AgentRegistry::new()).unwrap();
        let route = router.route_complex("a and b", None);
        assert!(route.plan.is_empty());
        assert_eq!(route.coordinator, None);
    }
}
