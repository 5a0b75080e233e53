//! Controller configuration
//!
//! Flags override environment variables, which override the defaults
//! below. The controller namespace comes from the orchestrator's in-pod
//! identity file when running in-cluster, then `CONTROLLER_NAMESPACE`,
//! then `"default"`; recipes run in the controller namespace unless
//! `--recipe-namespace` says otherwise.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::warn;

/// In-pod service account file naming the namespace the controller runs in.
const NAMESPACE_IDENTITY_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

#[derive(Debug, Parser)]
#[command(name = "triage-controller")]
#[command(about = "Incident-response recipe controller", long_about = None)]
pub struct Cli {
    /// Address recipes report structured results to
    #[arg(long, env = "AGGREGATOR_ADDRESS", default_value = "localhost:8080")]
    pub aggregator_address: String,

    /// Address of the pub/sub bus recipes publish on
    #[arg(long, env = "BUS_ADDRESS", default_value = "localhost:6379")]
    pub bus_address: String,

    /// HTTP address of the chat-bot
    #[arg(
        long = "webex-bot-address",
        env = "WEBEX_BOT_ADDRESS",
        default_value = "localhost:7001"
    )]
    pub bot_address: String,

    /// Timeout in seconds for recipe execution
    #[arg(long = "recipe-timeout", env = "RECIPE_TIMEOUT", default_value_t = 300)]
    pub recipe_timeout_seconds: u64,

    /// Namespace recipe jobs run in; defaults to the controller's own
    #[arg(long, env = "RECIPE_NAMESPACE")]
    pub recipe_namespace: Option<String>,

    /// Address the HTTP intake binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Disable TLS certificate verification towards the bot
    #[arg(long, env = "INSECURE_BOT_TLS")]
    pub insecure_bot_tls: bool,
}

/// Resolved, immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub aggregator_address: String,
    pub bus_address: String,
    pub bot_address: String,
    pub recipe_timeout: Duration,
    pub recipe_namespace: String,
    pub controller_namespace: String,
    pub bind_addr: String,
    pub insecure_bot_tls: bool,
}

impl Config {
    pub fn load(cli: Cli) -> Self {
        let controller_namespace = controller_namespace(
            Path::new(NAMESPACE_IDENTITY_FILE),
            std::env::var("CONTROLLER_NAMESPACE").ok(),
        );
        if controller_namespace == "default" {
            warn!("Could not resolve the controller namespace, using 'default'");
        }

        let recipe_namespace = cli
            .recipe_namespace
            .filter(|namespace| !namespace.is_empty())
            .unwrap_or_else(|| controller_namespace.clone());

        Self {
            aggregator_address: cli.aggregator_address,
            bus_address: cli.bus_address,
            bot_address: cli.bot_address,
            recipe_timeout: Duration::from_secs(cli.recipe_timeout_seconds),
            recipe_namespace,
            controller_namespace,
            bind_addr: cli.bind_addr,
            insecure_bot_tls: cli.insecure_bot_tls,
        }
    }
}

fn controller_namespace(identity_file: &Path, env_override: Option<String>) -> String {
    if let Ok(namespace) = std::fs::read_to_string(identity_file) {
        let namespace = namespace.trim();
        if !namespace.is_empty() {
            return namespace.to_string();
        }
    }

    if let Some(namespace) = env_override {
        if !namespace.is_empty() {
            return namespace;
        }
    }

    "default".to_string()
}
