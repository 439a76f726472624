use crate::error::ApiError;
use crate::models::{ListParams, RegistrationResponse};
use crate::state::AppState;
use crate::validation;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use roster::domain::response::{PageResponse, StatusResponse};
use roster::domain::{NewRegistration, RegistrationChanges};
use tracing::info;
use uuid::Uuid;

/// GET /registrations?page&size
pub async fn list_registrations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PageResponse>, ApiError> {
    let (page, size) = validation::page_params(params.page, params.size)?;
    Ok(Json(state.queries.list(page, size).await?))
}

/// POST /registrations
pub async fn create_registration(
    State(state): State<AppState>,
    Json(req): Json<NewRegistration>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    validation::new_registration(&req)?;
    info!("REGISTER: ticket_type={}", req.ticket_type);

    let outcome = state.operations.register(req).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// PUT /registrations/{id}
pub async fn update_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RegistrationChanges>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    validation::changes(&req)?;
    info!("UPDATE: id={}", id);

    let outcome = state.operations.update(id, req).await?;
    Ok(Json(outcome.into()))
}

/// DELETE /registrations/{id}
pub async fn cancel_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    info!("CANCEL: id={}", id);

    let outcome = state.operations.cancel(id).await?;
    Ok(Json(outcome.into()))
}

/// GET /registrations/status/{email}
pub async fn registration_status(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    validation::email(&email)?;
    Ok(Json(state.queries.status(&email).await?))
}
