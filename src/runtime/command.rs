//! Process adapter - runs an agent's command with the task as last argument

use super::AgentAdapter;
use crate::agent::AgentDescriptor;
use crate::{MaestroError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

/// Runs `command args... <task>` and returns trimmed stdout
///
/// A context value, when given, is passed as JSON in `MAESTRO_CONTEXT`.
pub struct CommandAdapter;

#[async_trait]
impl AgentAdapter for CommandAdapter {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn execute(
        &self,
        agent: &AgentDescriptor,
        task: &str,
        context: Option<&Value>,
    ) -> Result<Value> {
        let program = agent.command.as_deref().ok_or_else(|| {
            MaestroError::Adapter(format!("Agent {} has no command configured", agent.name))
        })?;

        let mut command = Command::new(program);
        command.args(&agent.args).arg(task).kill_on_drop(true);
        if let Some(context) = context {
            command.env("MAESTRO_CONTEXT", serde_json::to_string(context)?);
        }

        debug!(agent = %agent.name, program, "Running agent command");
        let output = command.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MaestroError::Adapter(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(Value::String(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    fn is_available(&self, agent: &AgentDescriptor) -> bool {
        agent.command.is_some()
    }
}
