//! Error types for Agentflow
//!
//! Provides a unified error type and the domain-specific error variants an
//! invocation can fail with.

use crate::types::AgentId;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias using AgentflowError
pub type Result<T> = std::result::Result<T, AgentflowError>;

/// Unified error type for Agentflow operations
#[derive(Debug, Error)]
pub enum AgentflowError {
    // Agent options failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Payload field missing or of the wrong shape
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    // Undefined arithmetic on extracted values
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    // Any of the above, attributed to the input message that caused it
    #[error("Message {message_id} rejected: {source}")]
    InMessage {
        message_id: Uuid,
        #[source]
        source: Box<AgentflowError>,
    },

    // Memory store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // External feed errors
    #[error("Feed error: {0}")]
    Feed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentflowError {
    /// Attribute this error to the input message that triggered it.
    pub fn in_message(self, message_id: Uuid) -> Self {
        match self {
            already @ AgentflowError::InMessage { .. } => already,
            other => AgentflowError::InMessage {
                message_id,
                source: Box::new(other),
            },
        }
    }

    /// The input message this error is attributed to, if any
    pub fn message_id(&self) -> Option<Uuid> {
        match self {
            AgentflowError::InMessage { message_id, .. } => Some(*message_id),
            _ => None,
        }
    }

    /// Data errors come from the input itself and are never worth retrying.
    pub fn is_data_error(&self) -> bool {
        match self {
            AgentflowError::Extraction(_) | AgentflowError::Arithmetic(_) => true,
            AgentflowError::InMessage { source, .. } => source.is_data_error(),
            _ => false,
        }
    }
}

/// An agent option that does not satisfy its constraints
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("option `{field}` {reason}")]
pub struct ValidationError {
    /// Name of the offending option
    pub field: String,
    /// Why it was rejected
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A required option is absent or blank
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }
}

/// Memory store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("corrupt memory for agent {agent_id}: {reason}")]
    Corrupt { agent_id: AgentId, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Payload extraction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("empty field path")]
    EmptyPath,

    #[error("no value at `{path}`")]
    Missing { path: String },

    #[error("value at `{path}` is not numeric: {found}")]
    NotNumeric { path: String, found: String },
}

/// Arithmetic errors on extracted values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("percentage change from a zero baseline at `{path}`")]
    ZeroBaseline { path: String },

    #[error("result at `{path}` is not a finite number")]
    NonFinite { path: String },

    #[error("value or result at `{path}` is out of the representable range")]
    OutOfRange { path: String },
}

// Implement From for common external error types
impl From<serde_json::Error> for AgentflowError {
    fn from(err: serde_json::Error) -> Self {
        AgentflowError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AgentflowError {
    fn from(err: std::io::Error) -> Self {
        AgentflowError::Store(StoreError::Io(err.to_string()))
    }
}

impl From<anyhow::Error> for AgentflowError {
    fn from(err: anyhow::Error) -> Self {
        AgentflowError::Internal(err.to_string())
    }
}
