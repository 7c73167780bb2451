//! Configuration loading for conclave.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the conclave home directory (~/.conclave).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".conclave"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.conclave/settings.json
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return the default set if no file exists.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

fn validate_settings(settings: &Settings) -> Result<()> {
    let mut seen = HashSet::new();
    for (kind, agent) in &settings.agents {
        if !agent.enabled {
            continue;
        }
        if agent.name.trim().is_empty() {
            return Err(Error::Config(format!(
                "agents.{} has an empty name",
                kind
            )));
        }
        if !seen.insert(agent.name.clone()) {
            return Err(Error::Config(format!(
                "agent name '{}' is used by more than one agent kind",
                agent.name
            )));
        }
    }

    if settings.system.message_processing_interval_ms == 0 {
        return Err(Error::Config(
            "system.message_processing_interval_ms must be greater than zero".to_string(),
        ));
    }
    if settings.system.max_queue_size == 0 {
        return Err(Error::Config(
            "system.max_queue_size must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Project configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_project_name() -> String {
    "conclave".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            deadline: None,
        }
    }
}

/// Per-agent enablement configuration, keyed by agent kind.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// System tunables.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SystemConfig {
    /// Interval between dispatcher delivery passes.
    #[serde(default = "default_processing_interval")]
    pub message_processing_interval_ms: u64,

    /// Soft bound on the pending queue; exceeding it logs a warning.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Optional bound on delivery attempts for unroutable messages.
    /// Unset means messages wait indefinitely for their receiver to register.
    #[serde(default)]
    pub delivery_max_attempts: Option<u32>,
}

fn default_processing_interval() -> u64 {
    1000
}

fn default_max_queue_size() -> usize {
    1000
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            message_processing_interval_ms: default_processing_interval(),
            max_queue_size: default_max_queue_size(),
            delivery_max_attempts: None,
        }
    }
}

/// Conclave settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default = "default_agents")]
    pub agents: HashMap<String, AgentConfig>,

    #[serde(default)]
    pub system: SystemConfig,
}

fn default_agents() -> HashMap<String, AgentConfig> {
    let mut agents = HashMap::new();
    for (kind, name) in [
        ("coordinator", "Coordinator"),
        ("developer", "Developer"),
        ("reviewer", "Reviewer"),
        ("optimizer", "Optimizer"),
        ("monitor", "Monitor"),
    ] {
        agents.insert(
            kind.to_string(),
            AgentConfig {
                name: name.to_string(),
                enabled: true,
            },
        );
    }
    agents
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            agents: default_agents(),
            system: SystemConfig::default(),
        }
    }
}
