//! Gateways to the controller's external collaborators
//!
//! The workload orchestrator and the result bus are reached only through
//! the traits here; everything above this layer is backend-agnostic and
//! tests run against in-memory implementations.

pub mod kube;
pub mod redis;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use triage_core::domain::RecipeSpec;
use triage_core::dto::{JobPhase, JobStatus};

use crate::config::Config;

/// Label stamped on every object the controller creates; the operator-level
/// garbage collection handle.
pub const APP_LABEL: &str = "triage";

/// File entry holding the incident payload inside a data config map.
pub const DATA_FILE: &str = "data.json";

/// Directory the data file is projected into inside recipe containers.
pub const DATA_MOUNT_PATH: &str = "/app";

/// Secret recipe credentials are wired from.
pub const RECIPE_SECRET: &str = "triage-keys";

/// Permissions the controller needs in the recipe namespace before it can
/// operate.
pub static REQUIRED_ACCESS: &[AccessRule] = &[
    AccessRule {
        group: "",
        resource: "configmaps",
        verbs: &["create", "deletecollection"],
    },
    AccessRule {
        group: "batch",
        resource: "jobs",
        verbs: &["get", "list", "create", "deletecollection"],
    },
];

/// One (api group, resource, verbs) permission requirement.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub group: &'static str,
    pub resource: &'static str,
    pub verbs: &'static [&'static str],
}

/// Equality-only label selector, rendered as `k=v,k=v`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector(Vec<(String, String)>);

impl Selector {
    /// Selector over everything this controller owns.
    pub fn app() -> Self {
        Self(vec![(
            "app".to_string(),
            APP_LABEL.to_string(),
        )])
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    /// Evaluate the selector locally, the way the backend would. In-memory
    /// gateway implementations filter with this.
    #[allow(dead_code)]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}

/// Labels for objects scoped to one incident.
pub fn object_labels(uuid: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL.to_string()),
        ("uuid".to_string(), uuid.to_string()),
    ])
}

/// Labels for one recipe's job (and its pod template).
pub fn job_labels(uuid: &str, recipe: &str) -> BTreeMap<String, String> {
    let mut labels = object_labels(uuid);
    labels.insert("recipe".to_string(), recipe.to_string());
    labels
}

/// Command line a recipe container runs: the declared entrypoint plus the
/// data-file path and the addresses recipes report back through.
pub fn recipe_command(spec: &RecipeSpec, config: &Config) -> String {
    format!(
        "{} --data-file-path {}/{} --aggregator-address {} --bus-address {}",
        spec.entrypoint,
        DATA_MOUNT_PATH,
        DATA_FILE,
        config.aggregator_address,
        config.bus_address
    )
}

/// Point-in-time view of a job as the orchestrator reports it.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub description: String,
    pub phase: JobPhase,
}

impl From<JobSnapshot> for JobStatus {
    fn from(snapshot: JobSnapshot) -> Self {
        JobStatus {
            name: snapshot.name,
            start_time: snapshot
                .created_at
                .map(|created| created.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            status: snapshot.phase,
            labels: snapshot.labels,
            description: snapshot.description,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator request failed: {0}")]
    Backend(String),
    #[error("orchestrator rejected the request: {0}")]
    Rejected(String),
    #[error("created object came back without a name")]
    MissingObjectName,
    #[error("failed to encode incident payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("missing orchestrator permissions: {0}")]
    AccessDenied(String),
    #[error("config object '{0}' not found")]
    NotFound(String),
}

/// Contract with the workload orchestrator. One implementation per backend;
/// nothing outside this module knows which one is in play.
#[async_trait]
pub trait OrchestratorGateway: Send + Sync {
    /// Create the data config map for one incident (or one action). The
    /// body is a single `data.json` entry holding the serialized payload.
    /// Returns the generated object name.
    async fn create_config_map(
        &self,
        namespace: &str,
        uuid: &str,
        data: &serde_json::Value,
    ) -> Result<String, OrchestratorError>;

    /// Create one run-once recipe job mounting `config_map`. Returns the
    /// generated job name.
    async fn create_job(
        &self,
        namespace: &str,
        recipe_name: &str,
        spec: &RecipeSpec,
        uuid: &str,
        config_map: &str,
        config: &Config,
    ) -> Result<String, OrchestratorError>;

    /// Read a named config object's file entries.
    async fn read_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, OrchestratorError>;

    async fn list_jobs(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<JobSnapshot>, OrchestratorError>;

    /// Foreground delete of every job matching `selector`. Deletion goes by
    /// collection so a partial failure cannot strand single objects.
    async fn delete_jobs(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<(), OrchestratorError>;

    async fn delete_config_maps(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<(), OrchestratorError>;

    /// Self-subject permission pre-flight; the error aggregates every
    /// missing permission so the operator sees the full list at once.
    async fn check_access(
        &self,
        namespace: &str,
        rules: &[AccessRule],
    ) -> Result<(), OrchestratorError>;
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus transport error: {0}")]
    Transport(String),
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

/// Keyed pub/sub transport recipes publish their results on.
#[async_trait]
pub trait BusGateway: Send + Sync {
    /// Open a subscription on `channel`. Resolves only once the backend has
    /// confirmed the subscription, so a publish racing the return is still
    /// delivered.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError>;

    /// Fire-and-forget publish; at-most-once.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;
}

/// A live channel subscription, owned by exactly one coordinator.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Next message, or `None` once the subscription is closed or the
    /// transport drops.
    async fn next_message(&mut self) -> Option<BusMessage>;

    /// Idempotent; any in-flight `next_message` observes the closure.
    async fn close(&mut self);
}
