//! Message - immutable event flowing between agents

use super::AgentId;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured message body: field name -> JSON value
pub type Payload = Map<String, Value>;

/// An event emitted by an agent.
///
/// Fields are private: once built, a message is only read. Provenance
/// (producing agent, creation time) travels with the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    agent_id: AgentId,
    payload: Payload,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(agent_id: AgentId, payload: Payload) -> Self {
        Self::at(agent_id, payload, Utc::now())
    }

    /// Create a message with an explicit creation time
    pub fn at(agent_id: AgentId, payload: Payload, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            agent_id,
            payload,
            created_at,
        }
    }

    /// Build a message from any JSON value; non-objects land under `value`.
    pub fn from_value(agent_id: AgentId, value: Value, created_at: DateTime<Utc>) -> Self {
        let payload = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Payload::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::at(agent_id, payload, created_at)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The agent that produced this message
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Creation time as Unix seconds
    pub fn timestamp(&self) -> i64 {
        self.created_at.timestamp()
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Convert Unix seconds back into a UTC timestamp, clamping invalid input to the epoch.
pub fn from_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_default()
}
