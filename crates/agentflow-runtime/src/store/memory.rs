//! In-memory store, used for tests and the `memory` storage backend

use super::MemoryStore;
use agentflow_common::{AgentId, Memory, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

/// Memory documents held in a concurrent map; lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    memories: DashMap<AgentId, Memory>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of agents with stored memory
    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, agent_id: &AgentId) -> Result<Memory, StoreError> {
        Ok(self
            .memories
            .get(agent_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn save(&self, agent_id: &AgentId, memory: &Memory) -> Result<(), StoreError> {
        self.memories.insert(agent_id.clone(), memory.clone());
        Ok(())
    }

    async fn delete(&self, agent_id: &AgentId) -> Result<bool, StoreError> {
        Ok(self.memories.remove(agent_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let store = InMemoryStore::new();
        let memory = store.load(&AgentId::from("nobody")).await.unwrap();
        assert!(memory.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStore::new();
        let id = AgentId::from("diff");
        let mut memory = Memory::new();
        memory.set("last_value", 5.5);

        store.save(&id, &memory).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), memory);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        let id = AgentId::from("diff");
        store.save(&id, &Memory::new()).await.unwrap();

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }
}
