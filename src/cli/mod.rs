//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Coordination core for multi-agent tooling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to MAESTRO_CONFIG, ./maestro.toml, ~/.maestro/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Shared context file, overriding the config
    #[arg(long, global = true)]
    pub context: Option<PathBuf>,

    /// Simulate every agent instead of running standalone commands
    #[arg(long, global = true)]
    pub simulate: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show agents, resources and shared context
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which agent a task would go to
    Route {
        /// Task description
        task: String,
    },

    /// Show the multi-agent plan for a task
    Plan {
        /// Task description
        task: String,

        /// Explicit subtask (repeatable); skips decomposition
        #[arg(short, long = "subtask")]
        subtasks: Vec<String>,
    },

    /// Run a task on the routed (or given) agent
    Run {
        /// Task description
        task: String,

        /// Agent to use instead of routing
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Plan a task across agents and run each step in order
    RunComplex {
        /// Task description
        task: String,

        /// Explicit subtask (repeatable); skips decomposition
        #[arg(short, long = "subtask")]
        subtasks: Vec<String>,
    },

    /// Show recent activity
    Actions {
        /// Only actions by this agent
        #[arg(short, long)]
        agent: Option<String>,

        /// Number of entries
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show ports, rate budgets and host load
    Resources,

    /// Take an exclusive lock on a resource
    Lock {
        /// Resource (usually a file path)
        resource: String,

        /// Agent taking the lock
        #[arg(short, long)]
        agent: String,
    },

    /// Release a lock held by an agent
    Unlock {
        /// Resource (usually a file path)
        resource: String,

        /// Agent holding the lock
        #[arg(short, long)]
        agent: String,
    },

    /// Manage shared goals
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Run the maintenance loop until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum GoalAction {
    /// Add a goal
    Add { goal: String },

    /// Mark a goal as done
    Done { goal: String },

    /// List open goals
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_subtasks() {
        let cli = Cli::try_parse_from([
            "maestro",
            "--simulate",
            "run-complex",
            "ship it",
            "--subtask",
            "build",
            "-s",
            "test",
        ])
        .unwrap();

        assert!(cli.simulate);
        match cli.command {
            Commands::RunComplex { task, subtasks } => {
                assert_eq!(task, "ship it");
                assert_eq!(subtasks, ["build", "test"]);
            }
            _ => panic!("expected run-complex"),
        }
    }

    #[test]
    fn lock_requires_agent() {
        assert!(Cli::try_parse_from(["maestro", "lock", "src/lib.rs"]).is_err());
        assert!(Cli::try_parse_from(["maestro", "lock", "src/lib.rs", "-a", "cline"]).is_ok());
    }
}
