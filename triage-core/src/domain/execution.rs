//! Recipe execution results
//!
//! The document a recipe container publishes on its incident channel once
//! it has finished.

use serde::{Deserialize, Serialize};

/// Status value a recipe reports when it ran to completion.
pub const STATUS_SUCCESSFUL: &str = "successful";

/// Result published by a recipe container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Name of the recipe that ran; keys the in-memory result table.
    pub name: String,
    /// Incident identifier the recipe was investigating.
    pub incident: String,
    /// `"successful"` or any failure string the recipe chose.
    pub status: String,
    #[serde(default)]
    pub results: ExecutionResults,
}

/// Structured findings; all fields optional on the wire so sparse
/// publications still decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResults {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub json: String,
    #[serde(default)]
    pub links: Vec<String>,
    /// Remediations the recipe suggests; surfaced to the bot for a human
    /// to pick from.
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Execution {
    pub fn is_successful(&self) -> bool {
        self.status == STATUS_SUCCESSFUL
    }
}
