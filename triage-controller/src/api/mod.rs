//! HTTP intake
//!
//! Three endpoints: the alert webhook (spawns a debugging run), the bot's
//! action selection (spawns an actions run), and the synchronous status
//! query. Spawned runs are fire-and-forget; intake never blocks on a
//! coordinator and never reports its outcome.

pub mod error;

mod actions;
mod alert;
mod status;

use std::sync::Arc;

use axum::{routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::runtime::Runtime;

/// Create the intake router with all endpoints
pub fn create_router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/webhook", post(alert::receive_alert))
        .route("/api/actions", post(actions::receive_actions))
        .route("/api/status", post(status::report_status))
        .with_state(runtime)
        .layer(TraceLayer::new_for_http())
}
