use anyhow::Result;
use clap::Parser;
use maestro::cli::{Cli, Commands, GoalAction};
use maestro::config::AppConfig;
use maestro::orchestrator::{ExecutionResult, Orchestrator};
use maestro::runtime::AdapterTable;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("maestro=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.context {
        config.context_path = path;
    }
    let adapters = if cli.simulate {
        AdapterTable::simulated()
    } else {
        AdapterTable::default()
    };
    let orchestrator = Orchestrator::new(&config, adapters)?;

    match cli.command {
        Commands::Status { json } => {
            let report = orchestrator.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!("Agents:");
            for (name, agent) in &report.agents {
                let port = agent.port.map(|p| format!(" :{}", p)).unwrap_or_default();
                let reachable = if agent.available { "" } else { " (unavailable)" };
                println!(
                    "  {:<20} {:<14} {:<7} p{}{}{}",
                    name,
                    agent.kind.to_string(),
                    agent.status.to_string(),
                    agent.priority,
                    port,
                    reachable
                );
            }

            let system = &report.resources.system;
            println!();
            println!(
                "System: cpu {:.1}%  mem {:.1}% ({:.1} GB free)  disk {:.1}%  connections {}",
                system.cpu_percent,
                system.memory_percent,
                system.memory_available_gb,
                system.disk_percent,
                system.connection_count
            );
            if report.resources.overloaded {
                println!("  WARNING: system resources are critically low");
            }

            println!();
            println!("Locked: {}", join_or_none(&report.context.locked_resources));
            println!("Goals:  {}", join_or_none(&report.context.goals));
            println!("Recent activity:");
            for action in &report.context.recent_actions {
                println!(
                    "  {} [{}] {}: {}",
                    action.timestamp.format("%H:%M:%S"),
                    action.status,
                    action.agent,
                    action.description
                );
            }
        }

        Commands::Route { task } => {
            let decision = orchestrator.route(&task);
            println!("Category:     {}", decision.category);
            match &decision.agent {
                Some(agent) => println!("Agent:        {}", agent),
                None => println!("Agent:        (none)"),
            }
            println!("Confidence:   {:.1}", decision.confidence);
            println!("Reasoning:    {}", decision.reasoning);
            println!("Alternatives: {}", join_or_none(&decision.alternatives));
        }

        Commands::Plan { task, subtasks } => {
            let route = orchestrator.plan(&task, non_empty(subtasks));
            println!(
                "Coordinator: {}",
                route.coordinator.as_deref().unwrap_or("(none)")
            );
            if route.plan.is_empty() {
                println!("No subtasks could be routed.");
            }
            for step in &route.plan {
                println!("  {}. [{}] {}", step.order, step.agent, step.task);
            }
        }

        Commands::Run { task, agent } => {
            let result = orchestrator.execute(&task, agent.as_deref(), None).await;
            print_result(&result);
            if !result.is_success() {
                std::process::exit(1);
            }
        }

        Commands::RunComplex { task, subtasks } => {
            let outcome = orchestrator.execute_complex(&task, non_empty(subtasks)).await;
            println!(
                "Coordinator: {}",
                outcome.coordinator.as_deref().unwrap_or("(none)")
            );
            for result in &outcome.results {
                print_result(result);
            }
            println!("{}", outcome.message);
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Actions { agent, limit } => {
            let actions = orchestrator.activity_log(agent.as_deref(), limit);
            if actions.is_empty() {
                println!("No recorded activity.");
            }
            for action in actions {
                println!(
                    "{} [{}] {}: {}",
                    action.timestamp.to_rfc3339(),
                    action.status,
                    action.agent,
                    action.description
                );
            }
        }

        Commands::Resources => {
            let summary = orchestrator.resources().resource_summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Lock { resource, agent } => {
            let context = orchestrator.context();
            if context.acquire_lock(&resource, &agent, context.lock_timeout()) {
                println!("Locked {} for {}", resource, agent);
            } else {
                let holder = context.lock_holder(&resource).unwrap_or_default();
                eprintln!("{} is locked by {}", resource, holder);
                std::process::exit(1);
            }
        }

        Commands::Unlock { resource, agent } => {
            if orchestrator.context().release_lock(&resource, &agent) {
                println!("Released {}", resource);
            } else {
                eprintln!("{} does not hold {}", agent, resource);
                std::process::exit(1);
            }
        }

        Commands::Goal { action } => {
            let context = orchestrator.context();
            match action {
                GoalAction::Add { goal } => {
                    context.add_goal(&goal);
                    println!("Added goal: {}", goal);
                }
                GoalAction::Done { goal } => {
                    context.complete_goal(&goal);
                    println!("Completed goal: {}", goal);
                }
                GoalAction::List => {
                    for goal in context.goals() {
                        println!("  - {}", goal);
                    }
                }
            }
        }

        Commands::Watch => {
            let report = orchestrator.maintenance_tick();
            println!(
                "Reaped {} stale lock(s); overloaded: {}",
                report.reaped_locks, report.overloaded
            );
            orchestrator.start_maintenance();
            println!("Maintenance running. Press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
            orchestrator.stop_maintenance().await;
        }
    }

    Ok(())
}

fn print_result(result: &ExecutionResult) {
    let agent = result.agent.as_deref().unwrap_or("(none)");
    println!("[{}] {}: {}", result.status, agent, result.message);
    if let Some(value) = &result.result {
        match value.as_str() {
            Some(text) => println!("{}", text),
            None => println!("{}", value),
        }
    }
}

fn non_empty(subtasks: Vec<String>) -> Option<Vec<String>> {
    (!subtasks.is_empty()).then_some(subtasks)
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
