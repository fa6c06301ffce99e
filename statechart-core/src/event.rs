//! Trigger events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An external or internal stimulus: a name and an opaque payload.
///
/// The engine never interprets payloads; they travel with the event and are
/// visible to the collaborators that consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event name, matched against transition event names.
    pub name: String,

    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl TriggerEvent {
    /// Creates an event with a null payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
        }
    }

    /// Creates an event carrying a payload.
    pub fn with_payload(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}
