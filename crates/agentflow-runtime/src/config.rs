//! Agentflow configuration
//!
//! Layers, lowest priority first: serde defaults, an optional
//! `agentflow.{toml,yaml,json}` file, then `AGENTFLOW__*` environment
//! variables (`AGENTFLOW__BUS__DEDUP_WINDOW_SECS=60`).

use crate::bus::BusConfig;
use agentflow_agents::{AgentOptions, Schedule};
use agentflow_common::{AgentId, AgentflowError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Config file looked up when `AGENTFLOW_CONFIG` is not set
pub const DEFAULT_CONFIG_NAME: &str = "agentflow";

/// Agentflow service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentflowConfig {
    pub storage: StorageSettings,
    pub bus: BusConfig,
    pub feeds: FeedSettings,
    pub log: LogSettings,
    /// Agent network, in registration order
    pub agents: Vec<AgentSpec>,
}

impl AgentflowConfig {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let name = std::env::var("AGENTFLOW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_NAME.to_string());
        Self::load_from(&name)
    }

    /// Load from a config file (extension optional, may be absent) plus the environment
    pub fn load_from(name: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(
                Environment::with_prefix("AGENTFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        let config: Self = config.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Agent ids are unique and every source names a configured agent
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for spec in &self.agents {
            if spec.id.is_empty() {
                return Err(AgentflowError::Config("agent id must not be empty".into()));
            }
            if !ids.insert(&spec.id) {
                return Err(AgentflowError::Config(format!("duplicate agent id `{}`", spec.id)));
            }
        }
        for spec in &self.agents {
            if let Some(missing) = spec.sources.iter().find(|s| !ids.contains(s)) {
                return Err(AgentflowError::Config(format!(
                    "agent `{}` lists unknown source `{missing}`",
                    spec.id
                )));
            }
        }
        Ok(())
    }
}

fn config_error(err: config::ConfigError) -> AgentflowError {
    AgentflowError::Config(err.to_string())
}

/// One agent of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    /// Display name; defaults to the id
    #[serde(default)]
    pub name: String,
    pub options: AgentOptions,
    /// Check cadence; the kind's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Agents whose messages this agent receives
    #[serde(default)]
    pub sources: Vec<AgentId>,
    #[serde(default)]
    pub disabled: bool,
}

impl AgentSpec {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

/// Memory store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Directory of the file backend
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("data/memory"),
        }
    }
}

/// Directory feed settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Root holding one sub-directory of JSON items per feed; feeds are off when unset
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Emit JSON log lines instead of the human format
    pub json: bool,
}
