//! Action selection intake

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

/// POST /api/actions
/// Accepts the bot's remediation selection for an existing incident and
/// spawns an actions run. The `uuid` must be the one the analysis carried;
/// the `actions` array is validated here so a malformed selection is a
/// request error rather than a silent no-op.
pub async fn receive_actions(
    State(runtime): State<Arc<Runtime>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(response) = body.map_err(|err| ApiError::BadRequest(format!("Invalid JSON: {err}")))?;
    let incident =
        Incident::from_value(response).map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let uuid = incident
        .uuid()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
        .to_string();
    let selection = incident
        .actions()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    info!(
        "Action selection received for incident '{}' ({} action(s))",
        uuid,
        selection.len()
    );
    tokio::spawn(coordinator::run_incident(
        runtime,
        incident,
        Flavor::Actions,
    ));

    Ok(Json(json!({ "message": "Response received and processed" })))
}
