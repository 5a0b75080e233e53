//! Per-incident coordinator
//!
//! One coordinator per in-flight incident. It owns the bus subscription for
//! the incident channel, counts results against the dispatched set under a
//! wall-clock deadline, aggregates the successful ones into an analysis for
//! the chat-bot, and deletes the orchestrator objects it is responsible
//! for.
//!
//! Ordering is the whole point: the subscription is confirmed before any
//! job is created, so the earliest possible publication is still delivered.
//! The bus is at-most-once and a late subscriber would simply lose results.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{error, info, warn};
use triage_core::domain::{Execution, Flavor, Incident, Recipe};
use triage_core::dto::AnalysisReport;

use crate::catalog;
use crate::executor;
use crate::gateway::{BusError, Selector, Subscription};
use crate::runtime::Runtime;

pub struct Coordinator {
    runtime: Arc<Runtime>,
    uuid: String,
    recipes: HashMap<String, Recipe>,
    subscription: Box<dyn Subscription>,
}

/// One full incident run: catalog → subscribe → dispatch → collect →
/// report → clean up. Detached from the intake request that triggered it;
/// every failure ends the incident here, the HTTP reply has long been
/// sent.
pub async fn run_incident(runtime: Arc<Runtime>, incident: Incident, flavor: Flavor) {
    let uuid = match incident.uuid() {
        Ok(uuid) => uuid.to_string(),
        Err(err) => {
            error!("Dropping incident without an identity: {}", err);
            return;
        }
    };

    let recipes = match catalog::load(
        runtime.orchestrator.as_ref(),
        &runtime.config.controller_namespace,
        flavor,
        true,
    )
    .await
    {
        Ok(recipes) => recipes,
        Err(err) => {
            error!("Dropping incident '{}': {}", uuid, err);
            return;
        }
    };

    let coordinator =
        match Coordinator::subscribe(Arc::clone(&runtime), uuid.clone(), recipes).await {
            Ok(coordinator) => coordinator,
            Err(err) => {
                error!(
                    "Dropping incident '{}', bus subscription failed: {}",
                    uuid, err
                );
                return;
            }
        };

    let dispatched = match flavor {
        Flavor::Debugging => {
            executor::dispatch_debugging(
                runtime.orchestrator.as_ref(),
                &runtime.config,
                &uuid,
                &coordinator.recipes,
                &incident,
            )
            .await
        }
        Flavor::Actions => {
            executor::dispatch_actions(
                runtime.orchestrator.as_ref(),
                &runtime.config,
                &uuid,
                &coordinator.recipes,
                &incident,
            )
            .await
        }
    };
    info!(
        "Incident '{}': dispatched {} '{}' recipe job(s)",
        uuid, dispatched, flavor
    );

    coordinator.run(dispatched).await;
}

impl Coordinator {
    /// Opens the incident channel and waits for the backend to confirm the
    /// subscription. No job may be created before this returns.
    pub async fn subscribe(
        runtime: Arc<Runtime>,
        uuid: String,
        recipes: HashMap<String, Recipe>,
    ) -> Result<Self, BusError> {
        let subscription = runtime.bus.subscribe(&uuid).await?;
        Ok(Self {
            runtime,
            uuid,
            recipes,
            subscription,
        })
    }

    /// Drive the state machine to completion. The subscription is closed
    /// exactly once and cleanup runs exactly once, on every exit path of
    /// the collection loop; the bot report sits between the two and its
    /// failures are swallowed.
    pub async fn run(mut self, dispatched: usize) {
        let completed = self.collect(dispatched).await;
        self.subscription.close().await;

        let report = self.aggregate(&completed);
        if let Err(err) = self.runtime.bot.post_analysis(&report).await {
            warn!(
                "Failed to forward the analysis for incident '{}': {}",
                self.uuid, err
            );
        }

        self.clean_up(&completed).await;
        info!(
            "Incident '{}' done: {}/{} recipe(s) reported",
            self.uuid,
            completed.len(),
            dispatched
        );
    }

    /// Race the message stream against the single-shot deadline,
    /// first-wins. Malformed payloads are logged and skipped without
    /// advancing the completion counter.
    async fn collect(&mut self, dispatched: usize) -> Vec<Execution> {
        let mut completed = Vec::new();
        if dispatched == 0 {
            return completed;
        }

        let deadline = tokio::time::sleep(self.runtime.config.recipe_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                message = self.subscription.next_message() => {
                    let message = match message {
                        Some(message) => message,
                        None => {
                            warn!(
                                "Bus subscription for incident '{}' ended early",
                                self.uuid
                            );
                            break;
                        }
                    };

                    let execution: Execution = match serde_json::from_str(&message.payload) {
                        Ok(execution) => execution,
                        Err(err) => {
                            warn!(
                                "Ignoring malformed result on channel '{}': {}",
                                message.channel, err
                            );
                            continue;
                        }
                    };
                    info!(
                        "Incident '{}': received result for recipe '{}' ({})",
                        self.uuid, execution.name, execution.status
                    );

                    // The spec side stays authoritative; only the execution
                    // slot of the table entry is written.
                    if let Some(recipe) = self.recipes.get_mut(&execution.name) {
                        recipe.execution = Some(execution.clone());
                    }

                    completed.push(execution);
                    if completed.len() == dispatched {
                        break;
                    }
                }
                _ = &mut deadline => {
                    warn!(
                        "Incident '{}': recipes failed to complete within {:?}, closing the channel",
                        self.uuid, self.runtime.config.recipe_timeout
                    );
                    break;
                }
            }
        }

        completed
    }

    /// Deterministic for a fixed iteration order of `completed`.
    fn aggregate(&self, completed: &[Execution]) -> AnalysisReport {
        let mut analysis = String::new();
        let mut actions = Vec::new();

        for execution in completed.iter().filter(|execution| execution.is_successful()) {
            analysis.push_str(&format!(
                "Recipe '{}' completed successfully in response to incident '{}': {} ",
                execution.name, execution.incident, execution.results.analysis
            ));
            actions.extend(execution.results.actions.iter().cloned());
        }

        AnalysisReport {
            uuid: self.uuid.clone(),
            analysis,
            actions,
        }
    }

    /// Deletes this incident's data config maps and the jobs of completed
    /// recipes. Jobs of recipes that never reported are kept on purpose:
    /// they may still be running and their pod logs are diagnostic.
    async fn clean_up(&self, completed: &[Execution]) {
        info!("Incident '{}': cleaning up created resources", self.uuid);
        let namespace = &self.runtime.config.recipe_namespace;

        let selector = Selector::app().with("uuid", &self.uuid);
        if let Err(err) = self
            .runtime
            .orchestrator
            .delete_config_maps(namespace, &selector)
            .await
        {
            error!(
                "Failed to delete config maps for incident '{}': {}",
                self.uuid, err
            );
        }

        let names: BTreeSet<&str> = completed
            .iter()
            .map(|execution| execution.name.as_str())
            .collect();
        for name in names {
            let selector = Selector::app().with("uuid", &self.uuid).with("recipe", name);
            if let Err(err) = self
                .runtime
                .orchestrator
                .delete_jobs(namespace, &selector)
                .await
            {
                error!("Failed to delete job(s) for recipe '{}': {}", name, err);
            }
        }
    }
}
