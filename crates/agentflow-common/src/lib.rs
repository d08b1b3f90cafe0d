//! # Agentflow Common
//!
//! Shared types and errors for the Agentflow stream-processing agents.
//!
//! ## Core Types
//!
//! - [`Message`]: immutable event with payload and provenance
//! - [`Memory`]: per-agent key/value state carried across invocations
//! - [`AgentId`]: configuration-assigned agent identity
//!
//! ## Payload access
//!
//! - [`payload::value_at`] / [`payload::numeric_at`]: typed field extraction
//! - [`payload::interpolate`]: `{{ path }}` templates

pub mod error;
pub mod payload;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    AgentflowError, ArithmeticError, ExtractionError, Result, StoreError, ValidationError,
};
pub use types::{message::from_timestamp, AgentId, Memory, Message, Payload};

/// Agentflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Group key used when an agent does not partition its input
pub const DEFAULT_GROUP: &str = "no_group";

/// Seconds in one day, the unit of every `*_in_days` option
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Decimal places used when an agent does not configure a precision
pub const DEFAULT_DECIMAL_PRECISION: u32 = 3;
