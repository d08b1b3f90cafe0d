//! Memory storage backends
//!
//! Agent memory is loaded and saved as one document per agent. A store never
//! sees a partial update: the runtime saves only the memory of a successful
//! invocation.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

use agentflow_common::{AgentId, Memory, StoreError};
use async_trait::async_trait;

/// Trait for memory storage backends
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Memory of an agent; empty when nothing was saved yet
    async fn load(&self, agent_id: &AgentId) -> Result<Memory, StoreError>;

    /// Replace the stored memory of an agent
    async fn save(&self, agent_id: &AgentId, memory: &Memory) -> Result<(), StoreError>;

    /// Drop the stored memory; returns whether anything was stored
    async fn delete(&self, agent_id: &AgentId) -> Result<bool, StoreError>;
}
