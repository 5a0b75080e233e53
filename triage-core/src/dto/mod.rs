//! DTOs
//!
//! Payloads the controller exchanges with the chat-bot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregated analysis forwarded to the bot once an incident's collection
/// window closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub uuid: String,
    pub analysis: String,
    /// Suggested remediations, flattened from the successful recipes in
    /// completion order.
    pub actions: Vec<String>,
}

/// Point-in-time view of one recipe job, answering a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub name: String,
    /// RFC3339; empty when the orchestrator has not stamped the job yet.
    #[serde(rename = "startTime")]
    pub start_time: String,
    pub status: JobPhase,
    pub labels: BTreeMap<String, String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Active,
    Completed,
    Failed,
}
