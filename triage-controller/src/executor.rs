//! Recipe executor
//!
//! Materializes a selected recipe set into orchestrator jobs plus their
//! data config maps. Individual create failures never abort the remaining
//! fan-out; the coordinator's deadline absorbs recipes that never start.
//!
//! Both entry points return the *dispatched count*: the size of the
//! intended recipe set, not the number of jobs that actually came up. A
//! recipe whose job failed to create is dispatched-but-never-completing,
//! and the deadline handles it like any other silent recipe.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{error, info};
use triage_core::domain::{Incident, Recipe};

use crate::config::Config;
use crate::gateway::OrchestratorGateway;

/// Fan out one job per recipe, all mounting a single config map carrying
/// the entire incident envelope.
pub async fn dispatch_debugging(
    orchestrator: &dyn OrchestratorGateway,
    config: &Config,
    uuid: &str,
    recipes: &HashMap<String, Recipe>,
    incident: &Incident,
) -> usize {
    if recipes.is_empty() {
        info!("Incident '{}': no debugging recipes enabled", uuid);
        return 0;
    }

    let config_map = match orchestrator
        .create_config_map(&config.recipe_namespace, uuid, &incident.to_value())
        .await
    {
        Ok(name) => name,
        Err(err) => {
            error!(
                "Failed to create the data config map for incident '{}': {}",
                uuid, err
            );
            return recipes.len();
        }
    };

    for (name, recipe) in recipes {
        match orchestrator
            .create_job(
                &config.recipe_namespace,
                name,
                &recipe.spec,
                uuid,
                &config_map,
                config,
            )
            .await
        {
            Ok(job) => info!("Created job '{}' for recipe '{}'", job, name),
            Err(err) => error!("Failed to create job for recipe '{}': {}", name, err),
        }
    }

    recipes.len()
}

/// Fan out one job per selected action whose name matches an installed
/// recipe, each with its own config map holding the action data plus the
/// incident uuid. Unknown action names are skipped without error; the bot
/// may propose actions this controller does not carry.
pub async fn dispatch_actions(
    orchestrator: &dyn OrchestratorGateway,
    config: &Config,
    uuid: &str,
    recipes: &HashMap<String, Recipe>,
    incident: &Incident,
) -> usize {
    let actions = match incident.actions() {
        Ok(actions) => actions,
        Err(err) => {
            error!(
                "Incident '{}': failed to parse the action selection: {}",
                uuid, err
            );
            return 0;
        }
    };

    let mut dispatched = 0;
    for action in actions {
        let recipe = match recipes.get(&action.name) {
            Some(recipe) => recipe,
            None => {
                info!("Skipping unknown action '{}'", action.name);
                continue;
            }
        };
        dispatched += 1;

        let mut data = action.data.clone();
        data.insert("uuid".to_string(), Value::String(uuid.to_string()));

        let config_map = match orchestrator
            .create_config_map(&config.recipe_namespace, uuid, &Value::Object(data))
            .await
        {
            Ok(name) => name,
            Err(err) => {
                error!(
                    "Failed to create config map for action '{}': {}",
                    action.name, err
                );
                continue;
            }
        };

        match orchestrator
            .create_job(
                &config.recipe_namespace,
                &action.name,
                &recipe.spec,
                uuid,
                &config_map,
                config,
            )
            .await
        {
            Ok(job) => info!("Created job '{}' for action '{}'", job, action.name),
            Err(err) => error!("Failed to create job for action '{}': {}", action.name, err),
        }
    }

    dispatched
}
