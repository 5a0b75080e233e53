//! Incident envelope
//!
//! Alerts arrive as arbitrary JSON. The envelope keeps that payload opaque
//! and passes unknown fields through unchanged into the per-incident config
//! map, while the fields the controller itself needs go through typed
//! accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the typed accessors over the envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("incident envelope must be a JSON object")]
    NotAnObject,
    #[error("envelope field '{0}' is missing")]
    MissingField(&'static str),
    #[error("envelope field '{field}' must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("malformed action at index {index}: {source}")]
    MalformedAction {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One human-selected remediation from the bot's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Must match a recipe name in the `actions` flavor to dispatch.
    pub name: String,
    /// Passed through to the spawned job's data file.
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Opaque alert payload plus the incident identity stamped on intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Incident(Map<String, Value>);

impl Incident {
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(EnvelopeError::NotAnObject),
        }
    }

    /// Stamps a fresh v4 identifier into the envelope and returns it. The
    /// identifier keys the bus channel, the orchestrator labels, and the
    /// final bot payload.
    pub fn stamp_uuid(&mut self) -> String {
        let uuid = Uuid::new_v4().to_string();
        self.0
            .insert("uuid".to_string(), Value::String(uuid.clone()));
        uuid
    }

    pub fn uuid(&self) -> Result<&str, EnvelopeError> {
        self.require_str("uuid")
    }

    pub fn require_str(&self, field: &'static str) -> Result<&str, EnvelopeError> {
        match self.0.get(field) {
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(EnvelopeError::WrongType {
                field,
                expected: "string",
            }),
            None => Err(EnvelopeError::MissingField(field)),
        }
    }

    pub fn opt_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// The human-selected remediation actions. An absent field is an empty
    /// selection, not an error; the bot only sends it on action responses.
    pub fn actions(&self) -> Result<Vec<Action>, EnvelopeError> {
        let entries = match self.0.get("actions") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(EnvelopeError::WrongType {
                    field: "actions",
                    expected: "array",
                })
            }
            None => return Ok(Vec::new()),
        };

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                serde_json::from_value(entry.clone())
                    .map_err(|source| EnvelopeError::MalformedAction { index, source })
            })
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
