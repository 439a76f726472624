use crate::error::ApiError;
use crate::models::{DeadLettersResponse, ReconcileResponse};
use crate::state::AppState;
use axum::{Json, extract::State};
use roster::ports::EventLog;
use tracing::info;

/// GET /admin/dead-letters
pub async fn list_dead_letters(
    State(state): State<AppState>,
) -> Result<Json<DeadLettersResponse>, ApiError> {
    let group = state.consumer.group().to_string();
    let dead_letters = state.event_log.dead_letters(&group).await?;

    Ok(Json(DeadLettersResponse {
        group,
        dead_letters,
    }))
}

/// POST /admin/reconcile
pub async fn reconcile_count(
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let count = state.reconciler.reconcile_now().await?;
    info!(count, "RECONCILE: counter reset from source of truth");
    Ok(Json(ReconcileResponse { count }))
}
