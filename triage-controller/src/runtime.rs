//! Shared runtime dependencies
//!
//! The controller keeps no global state: configuration and the
//! process-wide clients are bundled here and threaded through intake,
//! executor and coordinator explicitly.

use std::sync::Arc;

use triage_bot_client::BotClient;

use crate::config::Config;
use crate::gateway::{BusGateway, OrchestratorGateway};

/// Process-wide dependencies. Every client inside is safe for concurrent
/// use; coordinators share them without coordination.
#[derive(Clone)]
pub struct Runtime {
    pub config: Config,
    pub orchestrator: Arc<dyn OrchestratorGateway>,
    pub bus: Arc<dyn BusGateway>,
    pub bot: BotClient,
}
