//! Recipe definitions
//!
//! A recipe is a container image plus an entrypoint that investigates or
//! mitigates one aspect of an incident and publishes a structured result.
//! Definitions come from the catalog config object; the mapping key there
//! is the recipe name, unique within its flavor.

use serde::{Deserialize, Serialize};

use crate::domain::execution::Execution;

/// Declarative recipe definition as stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSpec {
    /// Disabled recipes stay in the catalog but are never dispatched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub image: String,
    pub entrypoint: String,
    #[serde(default)]
    pub description: String,
    /// Informational only; the sole parameter recipes consume on the wire
    /// is the data-file path.
    #[serde(default)]
    pub params: Vec<RecipeParam>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeParam {
    pub name: String,
    pub value: String,
}

/// Runtime pairing of a catalog spec with the result received for it.
///
/// `execution` is present iff a result arrived on the incident channel. The
/// spec side is authoritative from the catalog and is never overwritten by
/// a published result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub spec: RecipeSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl Recipe {
    pub fn new(spec: RecipeSpec) -> Self {
        Self {
            spec,
            execution: None,
        }
    }
}

/// The role of a recipe set: automatic fan-out on an alert, or fan-out of
/// human-selected remediations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Debugging,
    Actions,
}

impl Flavor {
    /// Key of this flavor's section in the catalog config object.
    pub fn section(&self) -> &'static str {
        match self {
            Flavor::Debugging => "debugging",
            Flavor::Actions => "actions",
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.section())
    }
}
