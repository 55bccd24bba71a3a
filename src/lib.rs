//! Maestro: coordination core for multi-agent tooling
//!
//! Several independent agents (IDE assistants, local services, standalone
//! helpers) share one machine. Maestro keeps them out of each other's way:
//! a shared context for locks, activity and knowledge, a resource manager
//! for ports and API budgets, and a router that sends each task to the agent
//! best suited for it.

pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod resources;
pub mod router;
pub mod runtime;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaestroError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid routing pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Adapter error: {0}")]
    Adapter(String),
}

pub type Result<T> = std::result::Result<T, MaestroError>;
