//! Status queries

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use triage_core::domain::Incident;
use triage_core::dto::JobStatus;

use crate::api::error::{ApiError, ApiResult};
use crate::gateway::Selector;
use crate::runtime::Runtime;

/// POST /api/status
/// Lists this controller's jobs, narrowed to one incident when the body
/// carries a `uuid`, classifies each and forwards the snapshots to the
/// bot. Synchronous, unlike the two spawn endpoints; the reply is still
/// just an acknowledgement, the data goes to the bot.
pub async fn report_status(
    State(runtime): State<Arc<Runtime>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body.map_err(|err| ApiError::BadRequest(format!("Invalid JSON: {err}")))?;
    let request =
        Incident::from_value(request).map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let mut selector = Selector::app();
    if let Some(uuid) = request.opt_str("uuid") {
        selector = selector.with("uuid", uuid);
    }

    match runtime
        .orchestrator
        .list_jobs(&runtime.config.recipe_namespace, &selector)
        .await
    {
        Ok(snapshots) => {
            let statuses: Vec<JobStatus> = snapshots.into_iter().map(JobStatus::from).collect();
            info!("Reporting {} job status(es) to the bot", statuses.len());
            if let Err(err) = runtime.bot.post_job_statuses(&statuses).await {
                warn!("Failed to forward job statuses: {}", err);
            }
        }
        Err(err) => error!("Failed to list jobs for the status request: {}", err),
    }

    Ok(Json(json!({ "message": "Status request received and processed" })))
}
