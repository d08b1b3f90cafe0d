//! JSON file store: one `<agent>.json` document per agent
//!
//! Saves write a temporary sibling file and rename it over the target, so a
//! crash mid-save leaves the previous document in place.

use super::MemoryStore;
use agentflow_common::{AgentId, Memory, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Durable store rooted at a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open a store, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, agent_id: &AgentId) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(agent_id)))
    }
}

/// File-system safe rendering of an agent id.
///
/// Ids made only of `[A-Za-z0-9_-]` are used as is; any other id is written
/// as `~` followed by the hex of its bytes. `~` never occurs in a plain id,
/// so distinct ids always map to distinct files.
fn file_stem(agent_id: &AgentId) -> String {
    let id = agent_id.as_str();
    let plain = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        id.to_string()
    } else {
        format!("~{}", hex::encode(id.as_bytes()))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {err}", path.display()))
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn load(&self, agent_id: &AgentId) -> Result<Memory, StoreError> {
        let path = self.path_for(agent_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Memory::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            agent_id: agent_id.clone(),
            reason: e.to_string(),
        })
    }

    #[instrument(skip(self, memory), fields(agent_id = %agent_id))]
    async fn save(&self, agent_id: &AgentId, memory: &Memory) -> Result<(), StoreError> {
        let path = self.path_for(agent_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(memory).map_err(|e| StoreError::Corrupt {
            agent_id: agent_id.clone(),
            reason: e.to_string(),
        })?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(bytes = bytes.len(), "Saved memory");
        Ok(())
    }

    async fn delete(&self, agent_id: &AgentId) -> Result<bool, StoreError> {
        let path = self.path_for(agent_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
