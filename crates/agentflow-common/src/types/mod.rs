//! Core Agentflow types

pub mod agent_id;
pub mod memory;
pub mod message;

pub use agent_id::AgentId;
pub use memory::Memory;
pub use message::{Message, Payload};
