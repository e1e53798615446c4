use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::services::dispatcher::{DispatchOutcome, PathParams};
use crate::services::triggers::{TriggerBinding, TriggerService};
use crate::AppState;

/// Document-change triggers, one route per watched document path.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/jobs/:job_id/applications/:application_id",
            post(job_application_updated),
        )
        .route(
            "/users/:user_id/appliedjobs/:job_id",
            post(user_applied_job_updated),
        )
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub outcome: DispatchOutcome,
}

async fn job_application_updated(
    State(state): State<Arc<AppState>>,
    Path((job_id, application_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<TriggerResponse>> {
    let params = PathParams {
        job_id: Some(job_id),
        application_id: Some(application_id),
        user_id: None,
    };
    handle_trigger(&state, TriggerBinding::JobApplications, params, &headers, &body).await
}

async fn user_applied_job_updated(
    State(state): State<Arc<AppState>>,
    Path((user_id, job_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<TriggerResponse>> {
    let params = PathParams {
        job_id: Some(job_id),
        application_id: None,
        user_id: Some(user_id),
    };
    handle_trigger(&state, TriggerBinding::UserAppliedJobs, params, &headers, &body).await
}

/// Verify and decode the event, then hand it to the dispatcher. Whatever the
/// dispatcher decides, an accepted event is answered with 200 so the trigger
/// layer does not redeliver it.
async fn handle_trigger(
    state: &Arc<AppState>,
    binding: TriggerBinding,
    params: PathParams,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<Json<TriggerResponse>> {
    TriggerService::verify_signature(state.config.trigger.secret.as_deref(), headers, body)?;
    let change = TriggerService::parse_change(body)?;

    tracing::info!(
        "Received document change: trigger={}, event_id={}, job_id={:?}, application_id={:?}, user_id={:?}",
        binding.as_str(),
        TriggerService::event_id(headers).as_deref().unwrap_or("-"),
        params.job_id,
        params.application_id,
        params.user_id
    );

    let source = binding.user_id_source(&params);
    let outcome = state.dispatcher.dispatch(&change, &params, &source).await;

    tracing::debug!("Trigger {} finished: {:?}", binding.as_str(), outcome);
    Ok(Json(TriggerResponse { outcome }))
}
