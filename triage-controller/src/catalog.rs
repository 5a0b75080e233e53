//! Recipe catalog
//!
//! Recipe definitions live in one config object in the controller
//! namespace, one YAML section per flavor: `debugging` recipes fan out
//! automatically on an alert, `actions` recipes run when a human picks a
//! remediation.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;
use triage_core::domain::{Flavor, Recipe, RecipeSpec};

use crate::gateway::{OrchestratorError, OrchestratorGateway};

/// Config object holding the recipe definitions.
pub const RECIPES_CONFIG_MAP: &str = "triage-recipes";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("recipe catalog unavailable: {0}")]
    Source(#[from] OrchestratorError),
    #[error("recipe catalog has no '{0}' section")]
    MissingSection(&'static str),
    #[error("malformed '{section}' recipe definitions: {source}")]
    Malformed {
        section: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Load the recipe set for `flavor`. With `only_enabled`, entries whose
/// spec carries `enabled: false` are dropped.
pub async fn load(
    orchestrator: &dyn OrchestratorGateway,
    namespace: &str,
    flavor: Flavor,
    only_enabled: bool,
) -> Result<HashMap<String, Recipe>, CatalogError> {
    let sections = orchestrator
        .read_config_map(namespace, RECIPES_CONFIG_MAP)
        .await?;

    let section = flavor.section();
    let raw = sections
        .get(section)
        .ok_or(CatalogError::MissingSection(section))?;

    let specs: HashMap<String, RecipeSpec> =
        serde_yaml::from_str(raw).map_err(|source| CatalogError::Malformed { section, source })?;

    let recipes: HashMap<String, Recipe> = specs
        .into_iter()
        .filter(|(_, spec)| !only_enabled || spec.enabled)
        .map(|(name, spec)| (name, Recipe::new(spec)))
        .collect();

    debug!("Loaded {} '{}' recipe(s)", recipes.len(), flavor);
    Ok(recipes)
}
