use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;
use vigil_core::{Error, Result};
use vigil_reliability::services::CreateServiceRequest;

pub async fn list_services(State(state): State<AppState>) -> Result<Response> {
    let services = state.services.list().await?;
    Ok(Json(services).into_response())
}

pub async fn create_service(
    State(state): State<AppState>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<Response> {
    request
        .validate()
        .map_err(|e| Error::validation(format!("Validation failed: {e}")))?;

    let service = state.services.create(&request).await?;
    Ok((StatusCode::CREATED, Json(service)).into_response())
}

pub async fn get_service(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let service = state
        .services
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("Service not found"))?;
    Ok(Json(service).into_response())
}
