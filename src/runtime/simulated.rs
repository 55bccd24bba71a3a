//! Stand-in adapter for agents without a real integration

use super::AgentAdapter;
use crate::Result;
use crate::agent::AgentDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Pretends to run the task after a short delay
pub struct SimulatedAdapter {
    delay: Duration,
}

impl SimulatedAdapter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl AgentAdapter for SimulatedAdapter {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute(
        &self,
        agent: &AgentDescriptor,
        _task: &str,
        _context: Option<&Value>,
    ) -> Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::String(format!("Simulated result from {}", agent.name)))
    }

    fn is_available(&self, _agent: &AgentDescriptor) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;

    #[tokio::test(start_paused = true)]
    async fn answers_after_delay() {
        let agent = AgentDescriptor::new("cline", AgentKind::IdeExtension, &[], 9);
        let start = tokio::time::Instant::now();

        let result = SimulatedAdapter::default()
            .execute(&agent, "write code", None)
            .await
            .unwrap();

        assert_eq!(result, Value::from("Simulated result from cline"));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
