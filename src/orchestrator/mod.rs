//! Orchestration service layer.
//!
//! Ties the shared context, resource manager, router and adapters together.
//! Per execution an agent moves `idle -> active -> idle | error`; the status
//! is written to the shared context and to the registry the router reads.
//!
//! There is no cancellation: an adapter that never returns holds its
//! `execute` call forever.

mod maintenance;
mod report;

pub use report::{
    AgentReport, ComplexExecutionResult, ContextReport, ExecutionResult, ExecutionStatus,
    MaintenanceReport, StatusReport,
};

use crate::Result;
use crate::agent::{AgentDescriptor, AgentRegistry, AgentStatus};
use crate::config::AppConfig;
use crate::context::{ActionDetails, ActionEntry, ActionStatus, SharedContext};
use crate::resources::{HostProbe, ResourceManager};
use crate::router::{ComplexRoute, RouteDecision, TaskRouter};
use crate::runtime::AdapterTable;
use maintenance::MaintenanceHandle;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TASK_PREVIEW_CHARS: usize = 100;
const RESULT_PREVIEW_CHARS: usize = 200;
const STATUS_RECENT_ACTIONS: usize = 5;

/// Orchestration service coordinating routing, adapters and shared state.
pub struct Orchestrator {
    registry: AgentRegistry,
    context: Arc<SharedContext>,
    resources: Arc<ResourceManager>,
    router: TaskRouter,
    adapters: AdapterTable,
    rate_limit_wait: Duration,
    maintenance_interval: Duration,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl Orchestrator {
    /// Build every component from configuration
    pub fn new(config: &AppConfig, adapters: AdapterTable) -> Result<Self> {
        config.validate()?;

        let registry = AgentRegistry::from_agents(config.agent_descriptors());
        let router = TaskRouter::new(
            registry,
            &config.routing_rules(),
            config.default_category.clone(),
            config.coordinator.clone(),
        )?;
        let context = SharedContext::open(
            &config.context_path,
            config.lock_timeout(),
            config.action_log_capacity,
        );
        let resources = ResourceManager::new(
            config.rate_limits.clone(),
            config.port_probe_span,
            config.overload.clone(),
        )
        .with_system_probe(HostProbe::new(&config.disk_path));

        info!(
            agents = router.registry().len(),
            context = %config.context_path.display(),
            "Orchestrator ready"
        );

        Ok(Self::with_parts(context, resources, router, adapters)
            .with_rate_limit_wait(config.rate_limit_wait())
            .with_maintenance_interval(config.maintenance_interval()))
    }

    /// Assemble from pre-built components; the router's registry is shared
    ///
    /// Statuses persisted in the context override the registry's for agents
    /// it knows, so an agent that failed before a restart stays deprioritized.
    pub fn with_parts(
        context: SharedContext,
        resources: ResourceManager,
        router: TaskRouter,
        adapters: AdapterTable,
    ) -> Self {
        let registry = router.registry().clone();
        for (name, status) in context.agent_states() {
            if status != AgentStatus::Unknown && registry.set_status(&name, status) {
                debug!(agent = %name, %status, "Restored agent status");
            }
        }

        let defaults = AppConfig::default();
        Self {
            registry,
            context: Arc::new(context),
            resources: Arc::new(resources),
            router,
            adapters,
            rate_limit_wait: defaults.rate_limit_wait(),
            maintenance_interval: defaults.maintenance_interval(),
            maintenance: Mutex::new(None),
        }
    }

    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    pub fn with_maintenance_interval(mut self, period: Duration) -> Self {
        self.maintenance_interval = period;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn adapters(&self) -> &AdapterTable {
        &self.adapters
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run `task` on `agent_override` or on the routed agent
    ///
    /// Never fails: routing, lookup, rate-limit and adapter problems all come
    /// back as a `Failure` result.
    pub async fn execute(
        &self,
        task: &str,
        agent_override: Option<&str>,
        context: Option<&Value>,
    ) -> ExecutionResult {
        let name = match agent_override {
            Some(name) => name.to_string(),
            None => match self.router.route(task, context).agent {
                Some(name) => name,
                None => return ExecutionResult::failure(None, "No suitable agent found for task"),
            },
        };

        let Some(agent) = self.registry.get(&name) else {
            return ExecutionResult::failure(Some(&name), format!("Agent \"{name}\" not found"));
        };

        let adapter = match self.adapters.get(agent.kind) {
            Ok(adapter) => adapter,
            Err(e) => return ExecutionResult::failure(Some(&name), format!("Error: {e}")),
        };

        if let Some(service) = agent.service.as_deref() {
            if !self
                .resources
                .wait_for_availability(service, self.rate_limit_wait)
                .await
            {
                warn!(agent = %name, service, "Rate limit reached, task not dispatched");
                return ExecutionResult::failure(
                    Some(&name),
                    format!("Rate limit reached for {service}"),
                );
            }
            self.resources.record_call(service, &name);
        }

        let task_preview = preview(task, TASK_PREVIEW_CHARS);
        self.set_status(&name, AgentStatus::Active);
        self.context.record_action(
            &name,
            format!("Executing: {task_preview}"),
            ActionStatus::InProgress,
            ActionDetails::new(),
        );
        debug!(agent = %name, adapter = adapter.name(), "Dispatching task");

        match adapter.execute(&agent, task, context).await {
            Ok(result) => {
                self.set_status(&name, AgentStatus::Idle);
                let mut details = ActionDetails::new();
                details.insert(
                    "result".to_string(),
                    Value::String(preview(&display_value(&result), RESULT_PREVIEW_CHARS)),
                );
                self.context.record_action(
                    &name,
                    format!("Completed: {task_preview}"),
                    ActionStatus::Success,
                    details,
                );
                info!(agent = %name, "Task completed");
                ExecutionResult::success(&name, result)
            }
            Err(e) => {
                self.set_status(&name, AgentStatus::Error);
                let mut details = ActionDetails::new();
                details.insert("error".to_string(), Value::String(e.to_string()));
                self.context.record_action(
                    &name,
                    format!("Failed: {task_preview}"),
                    ActionStatus::Failure,
                    details,
                );
                warn!(agent = %name, "Task failed: {}", e);
                ExecutionResult::failure(Some(&name), format!("Error: {e}"))
            }
        }
    }

    /// Plan `task` across agents and run the steps in order
    ///
    /// Stops at the first failed step; completed steps are not undone.
    pub async fn execute_complex(
        &self,
        task: &str,
        subtasks: Option<Vec<String>>,
    ) -> ComplexExecutionResult {
        let ComplexRoute {
            coordinator,
            agents,
            plan,
        } = self.router.route_complex(task, subtasks);

        if plan.is_empty() {
            return ComplexExecutionResult {
                status: ExecutionStatus::Failure,
                coordinator,
                agents,
                results: Vec::new(),
                message: "No subtasks could be routed".to_string(),
            };
        }

        let mut results = Vec::with_capacity(plan.len());
        for step in &plan {
            let result = self.execute(&step.task, Some(&step.agent), None).await;
            let failed = !result.is_success();
            let message = format!("Failed at step {}: {}", step.order, result.message);
            results.push(result);

            if failed {
                return ComplexExecutionResult {
                    status: ExecutionStatus::Failure,
                    coordinator,
                    agents,
                    results,
                    message,
                };
            }
        }

        ComplexExecutionResult {
            status: ExecutionStatus::Success,
            coordinator,
            agents,
            results,
            message: "Complex task completed successfully".to_string(),
        }
    }

    fn set_status(&self, agent: &str, status: AgentStatus) {
        self.context.set_agent_state(agent, status);
        self.registry.set_status(agent, status);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn status(&self) -> StatusReport {
        let agents = self
            .registry
            .list()
            .into_iter()
            .map(|agent| {
                let status = match self.context.agent_state(&agent.name) {
                    AgentStatus::Unknown => agent.status,
                    known => known,
                };
                let report = AgentReport {
                    kind: agent.kind,
                    status,
                    available: self.adapters.is_available(&agent),
                    capabilities: agent.capabilities,
                    priority: agent.priority,
                    port: agent.port.filter(|_| agent.kind.is_networked()),
                };
                (agent.name, report)
            })
            .collect();

        StatusReport {
            agents,
            resources: self.resources.resource_summary(),
            context: ContextReport {
                locked_resources: self.context.locked_resources(),
                goals: self.context.goals(),
                recent_actions: self.context.recent_actions(None, STATUS_RECENT_ACTIONS),
            },
        }
    }

    pub fn activity_log(&self, agent: Option<&str>, limit: usize) -> Vec<ActionEntry> {
        self.context.recent_actions(agent, limit)
    }

    /// Routing without execution
    pub fn route(&self, task: &str) -> RouteDecision {
        self.router.route(task, None)
    }

    /// Planning without execution
    pub fn plan(&self, task: &str, subtasks: Option<Vec<String>>) -> ComplexRoute {
        self.router.route_complex(task, subtasks)
    }

    pub fn register_agent(&self, agent: AgentDescriptor) {
        info!(agent = %agent.name, kind = %agent.kind, "Registered agent");
        self.registry.register(agent);
    }

    pub fn unregister_agent(&self, name: &str) -> bool {
        self.registry.unregister(name).is_some()
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Run one maintenance pass now
    pub fn maintenance_tick(&self) -> MaintenanceReport {
        maintenance::run_tick(&self.context, &self.resources)
    }

    /// Start the background maintenance loop; false if already running
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_maintenance(&self) -> bool {
        let mut slot = self.maintenance.lock();
        if slot.as_ref().is_some_and(MaintenanceHandle::is_running) {
            return false;
        }
        *slot = Some(MaintenanceHandle::spawn(
            Arc::clone(&self.context),
            Arc::clone(&self.resources),
            self.maintenance_interval,
        ));
        true
    }

    /// Stop the loop and wait for it; false if it was not running
    pub async fn stop_maintenance(&self) -> bool {
        let handle = self.maintenance.lock().take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance
            .lock()
            .as_ref()
            .is_some_and(MaintenanceHandle::is_running)
    }
}

/// First `max` characters of `text`
fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MaestroError;
    use crate::agent::AgentKind;
    use crate::context::DEFAULT_LOCK_TIMEOUT;
    use crate::runtime::{AgentAdapter, SimulatedAdapter};
    use async_trait::async_trait;

    /// Records tasks it receives and fails those containing "explode"
    #[derive(Default)]
    struct ScriptedAdapter {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AgentAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn execute(
            &self,
            agent: &AgentDescriptor,
            task: &str,
            _context: Option<&Value>,
        ) -> Result<Value> {
            self.seen.lock().push((agent.name.clone(), task.to_string()));
            if task.contains("explode") {
                return Err(MaestroError::Adapter("boom".to_string()));
            }
            Ok(Value::String("x".repeat(500)))
        }

        fn is_available(&self, _agent: &AgentDescriptor) -> bool {
            true
        }
    }

    fn orchestrator_with(adapter: Arc<dyn AgentAdapter>) -> Orchestrator {
        let registry = AgentRegistry::new();
        registry.register(AgentDescriptor::new(
            "writer",
            AgentKind::Standalone,
            &["code_generation"],
            9,
        ));
        registry.register(AgentDescriptor::new(
            "analyzer",
            AgentKind::WebService,
            &["audio_analysis"],
            8,
        ));
        let router = TaskRouter::with_default_rules(registry).unwrap();
        Orchestrator::with_parts(
            SharedContext::in_memory(DEFAULT_LOCK_TIMEOUT, 100),
            ResourceManager::default(),
            router,
            AdapterTable::uniform(adapter),
        )
    }

    fn scripted() -> (Orchestrator, Arc<ScriptedAdapter>) {
        let adapter = Arc::new(ScriptedAdapter::default());
        (orchestrator_with(adapter.clone()), adapter)
    }

    #[tokio::test]
    async fn success_returns_agent_to_idle() {
        let (orch, _) = scripted();
        let result = orch.execute("create a function to add", None, None).await;

        assert!(result.is_success());
        assert_eq!(result.agent.as_deref(), Some("writer"));
        assert_eq!(result.message, "Task completed by writer");
        assert_eq!(orch.context().agent_state("writer"), AgentStatus::Idle);

        let log = orch.activity_log(Some("writer"), 10);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].status, ActionStatus::InProgress);
        assert_eq!(log[0].description, "Executing: create a function to add");
        assert_eq!(log[1].status, ActionStatus::Success);
        let preview = log[1].details["result"].as_str().unwrap();
        assert_eq!(preview.chars().count(), RESULT_PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn adapter_error_marks_agent_failed() {
        let (orch, _) = scripted();
        let result = orch.execute("explode please", Some("analyzer"), None).await;

        assert_eq!(result.status, ExecutionStatus::Failure);
        assert_eq!(result.message, "Error: Adapter error: boom");
        assert_eq!(orch.context().agent_state("analyzer"), AgentStatus::Error);
        assert_eq!(
            orch.registry().get("analyzer").unwrap().status,
            AgentStatus::Error
        );

        let last = orch.activity_log(Some("analyzer"), 1).pop().unwrap();
        assert_eq!(last.status, ActionStatus::Failure);
        assert_eq!(last.details["error"], "Adapter error: boom");
    }

    #[tokio::test]
    async fn unknown_override_touches_nothing() {
        let (orch, adapter) = scripted();
        let result = orch.execute("anything", Some("ghost"), None).await;

        assert_eq!(result.status, ExecutionStatus::Failure);
        assert_eq!(result.message, "Agent \"ghost\" not found");
        assert!(orch.activity_log(None, 10).is_empty());
        assert!(adapter.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_registry_cannot_execute() {
        let (orch, _) = scripted();
        orch.unregister_agent("writer");
        orch.unregister_agent("analyzer");

        let result = orch.execute("write code", None, None).await;
        assert_eq!(result.agent, None);
        assert_eq!(result.message, "No suitable agent found for task");
    }

    #[tokio::test]
    async fn long_tasks_are_truncated_in_log() {
        let (orch, _) = scripted();
        let task = format!("implement {}", "é".repeat(300));
        orch.execute(&task, Some("writer"), None).await;

        let first = &orch.activity_log(None, 10)[0];
        let shown = first.description.trim_start_matches("Executing: ");
        assert_eq!(shown.chars().count(), TASK_PREVIEW_CHARS);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_service_is_not_dispatched() {
        let (orch, adapter) = scripted();
        orch.register_agent(
            AgentDescriptor::new("copilot", AgentKind::WebService, &["music_chat"], 8)
                .with_service("kimi_k2"),
        );
        orch.resources().set_rate_limit("kimi_k2", 1);
        let orch = orch.with_rate_limit_wait(Duration::from_secs(2));

        assert!(orch.execute("first", Some("copilot"), None).await.is_success());
        let second = orch.execute("second", Some("copilot"), None).await;

        assert_eq!(second.message, "Rate limit reached for kimi_k2");
        assert_eq!(adapter.seen.lock().len(), 1);
        assert_eq!(orch.context().agent_state("copilot"), AgentStatus::Idle);
        assert_eq!(orch.resources().remaining_calls("kimi_k2"), Some(0));
    }

    #[tokio::test]
    async fn complex_task_runs_steps_in_order() {
        let (orch, adapter) = scripted();
        let outcome = orch
            .execute_complex("refactor module A and analyze audio output", None)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.coordinator.as_deref(), Some("writer"));
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            *adapter.seen.lock(),
            [
                ("writer".to_string(), "refactor module A".to_string()),
                ("analyzer".to_string(), "analyze audio output".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn complex_task_stops_at_first_failure() {
        let (orch, adapter) = scripted();
        let outcome = orch
            .execute_complex(
                "ignored",
                Some(vec![
                    "write code".into(),
                    "explode the mix levels check".into(),
                    "write more code".into(),
                ]),
            )
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Failure);
        assert_eq!(outcome.message, "Failed at step 2: Error: Adapter error: boom");
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(adapter.seen.lock().len(), 2);
        // step 1 is not rolled back
        assert!(outcome.results[0].is_success());
    }

    #[tokio::test]
    async fn complex_task_without_agents_fails() {
        let (orch, _) = scripted();
        orch.unregister_agent("writer");
        orch.unregister_agent("analyzer");

        let outcome = orch.execute_complex("a and b", None).await;
        assert_eq!(outcome.status, ExecutionStatus::Failure);
        assert_eq!(outcome.message, "No subtasks could be routed");
    }

    #[tokio::test]
    async fn status_merges_context_and_registry() {
        let orch = orchestrator_with(Arc::new(SimulatedAdapter::new(Duration::ZERO)));
        orch.context().add_goal("ship 1.0");
        orch.context()
            .acquire_lock("src/lib.rs", "writer", DEFAULT_LOCK_TIMEOUT);
        orch.execute("analyze audio", Some("analyzer"), None).await;

        let report = orch.status();
        assert_eq!(report.agents.len(), 2);
        assert_eq!(report.agents["analyzer"].status, AgentStatus::Idle);
        assert!(report.agents["writer"].available);
        assert_eq!(report.context.goals, ["ship 1.0"]);
        assert_eq!(report.context.locked_resources.len(), 1);
        assert!(report.context.recent_actions.len() <= STATUS_RECENT_ACTIONS);
        assert!(report.resources.rate_limits.contains_key("anthropic"));
        assert!(serde_json::to_value(&report).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_starts_once_and_stops() {
        let (orch, _) = scripted();
        assert!(!orch.stop_maintenance().await);

        assert!(orch.start_maintenance());
        assert!(!orch.start_maintenance());
        assert!(orch.is_maintenance_running());

        assert!(orch.stop_maintenance().await);
        assert!(!orch.is_maintenance_running());
    }

    #[test]
    fn maintenance_tick_reaps_stale_locks() {
        let (orch, _) = scripted();
        orch.context().acquire_lock("mix.wav", "analyzer", DEFAULT_LOCK_TIMEOUT);
        orch.context().backdate_lock("mix.wav", Duration::from_secs(301));

        let report = orch.maintenance_tick();
        assert_eq!(report.reaped_locks, 1);
        assert_eq!(orch.context().lock_holder("mix.wav"), None);
    }

    #[test]
    fn status_shows_ports_of_networked_agents_only() {
        let (orch, _) = scripted();
        orch.register_agent(
            AgentDescriptor::new("ui", AgentKind::WebService, &["chat"], 5).with_port(8080),
        );
        orch.register_agent(
            AgentDescriptor::new("helper", AgentKind::Standalone, &["chat"], 5).with_port(9090),
        );

        let report = orch.status();
        assert_eq!(report.agents["ui"].port, Some(8080));
        assert_eq!(report.agents["helper"].port, None);
    }

    #[test]
    fn persisted_failure_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            context_path: dir.path().join("context.json"),
            ..AppConfig::default()
        };
        {
            let context = SharedContext::open(&config.context_path, DEFAULT_LOCK_TIMEOUT, 100);
            context.set_agent_state("cline", AgentStatus::Error);
            context.set_agent_state("ghost", AgentStatus::Error);
        }

        let orch = Orchestrator::new(&config, AdapterTable::simulated()).unwrap();
        assert_eq!(orch.registry().get("cline").unwrap().status, AgentStatus::Error);
        assert_eq!(orch.status().agents["cline"].status, AgentStatus::Error);
        assert!(orch.registry().get("ghost").is_none());

        let decision = orch.route("write code for a parser");
        assert_eq!(decision.agent.as_deref(), Some("cursor_ai"));
        assert!(decision.alternatives.contains(&"cline".to_string()));
    }

    #[test]
    fn builds_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            context_path: dir.path().join("context.json"),
            ..AppConfig::default()
        };

        let orch = Orchestrator::new(&config, AdapterTable::simulated()).unwrap();
        assert_eq!(orch.registry().len(), 8);
        assert_eq!(orch.route("mix this track").agent.as_deref(), Some("mixing_engineer"));
    }
}
