//! Error types for conclave.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Agent already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    #[error("Task dependencies not completed: {0:?}")]
    DependenciesUnmet(Vec<String>),

    #[error("{0}")]
    Other(String),
}
