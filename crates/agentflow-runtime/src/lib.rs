//! # Agentflow Runtime
//!
//! Wires agents into a network and runs it.
//!
//! ## Components
//!
//! - [`store`]: per-agent memory persistence (in-memory or JSON files)
//! - [`bus`]: fan-out of emitted messages to subscribers, with dedup
//! - [`runtime`]: serialized, all-or-nothing agent invocations and health
//! - [`scheduler`]: cadence-driven `check` calls
//! - [`feeds`]: directory-backed [`agentflow_agents::FeedSource`]

pub mod bus;
pub mod config;
pub mod feeds;
pub mod metrics;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use bus::{BusConfig, Delivery, MessageBus};
pub use config::{AgentSpec, AgentflowConfig, StorageBackend};
pub use feeds::DirectoryFeed;
pub use metrics::MetricsSnapshot;
pub use runtime::{AgentHealth, InvocationError, Registration, Runtime};
pub use scheduler::Scheduler;
pub use store::{InMemoryStore, JsonFileStore, MemoryStore};
