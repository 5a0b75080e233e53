//! Alert webhook

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;
use triage_core::domain::{Flavor, Incident};

use crate::api::error::{ApiError, ApiResult};
use crate::coordinator;
use crate::runtime::Runtime;

/// POST /webhook
/// Accepts an arbitrary alert object, stamps the incident identity and
/// spawns a debugging run. Replies immediately; the run outlives this
/// request and reports through the bot, not through this response.
pub async fn receive_alert(
    State(runtime): State<Arc<Runtime>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(alert) = body.map_err(|err| ApiError::BadRequest(format!("Invalid JSON: {err}")))?;
    let mut incident =
        Incident::from_value(alert).map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let uuid = incident.stamp_uuid();

    info!("Alert received, incident '{}'", uuid);
    tokio::spawn(coordinator::run_incident(
        runtime,
        incident,
        Flavor::Debugging,
    ));

    Ok(Json(json!({ "message": "Alert received and processed" })))
}
