//! Triage Controller
//!
//! An always-on incident-response controller: alerts fan out containerized
//! diagnostic recipes as orchestrator jobs, recipe results come back over
//! a per-incident bus channel, and the aggregated analysis goes to the
//! chat-bot for human follow-up. Human-selected remediations arrive later
//! through the same intake and fan out the same way.
//!
//! Architecture:
//! - Gateways: thin contracts over the workload orchestrator and the bus
//! - Catalog: recipe definitions from a config object
//! - Executor: materializes recipes into jobs plus their data volumes
//! - Coordinator: per-incident subscribe → dispatch → collect → report → clean
//! - API: HTTP intake for alerts, action selections, and status queries
//!
//! No state survives a restart; in-flight incidents are abandoned on
//! shutdown and their leftovers are reaped by the operator on the app
//! label.

mod api;
mod catalog;
mod config;
mod coordinator;
mod executor;
mod gateway;
mod runtime;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_bot_client::BotClient;

use crate::config::{Cli, Config};
use crate::gateway::kube::KubeGateway;
use crate::gateway::redis::RedisBus;
use crate::gateway::{OrchestratorGateway, REQUIRED_ACCESS};
use crate::runtime::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_controller=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting triage controller");

    let config = Config::load(Cli::parse());
    info!(
        "Configuration: bot={}, bus={}, recipe namespace={}, recipe timeout={:?}",
        config.bot_address, config.bus_address, config.recipe_namespace, config.recipe_timeout
    );

    if config.insecure_bot_tls {
        warn!("TLS certificate verification towards the bot is DISABLED");
    }
    let bot = BotClient::builder(&config.bot_address)
        .insecure(config.insecure_bot_tls)
        .build()
        .context("Failed to build the bot client")?;

    let bus = RedisBus::connect(&config.bus_address)
        .await
        .context("Failed to connect to the bus")?;
    info!("Bus connected: {}", config.bus_address);

    let orchestrator = KubeGateway::try_default()
        .await
        .context("Failed to initialise the orchestrator client")?;

    // Permission pre-flight: fail at startup, not on the first incident.
    orchestrator
        .check_access(&config.recipe_namespace, REQUIRED_ACCESS)
        .await
        .context("Orchestrator permission pre-flight failed")?;
    info!(
        "Orchestrator permissions verified in namespace '{}'",
        config.recipe_namespace
    );

    let bind_addr = config.bind_addr.clone();
    let runtime = Arc::new(Runtime {
        config,
        orchestrator: Arc::new(orchestrator),
        bus: Arc::new(bus),
        bot,
    });

    let app = api::create_router(runtime);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Cooperative shutdown: outstanding coordinators are not drained, and
    // their orchestrator jobs keep running.
    info!("Shutting down; in-flight incidents are abandoned");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install the interrupt handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install the termination handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
