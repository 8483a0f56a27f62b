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
use vigil_reliability::slo::{CreateSloRequest, UpdateSloRequest};

pub async fn list_slos(State(state): State<AppState>) -> Result<Response> {
    let slos = state.slos.list().await?;
    Ok(Json(slos).into_response())
}

pub async fn create_slo(
    State(state): State<AppState>,
    Json(request): Json<CreateSloRequest>,
) -> Result<Response> {
    request
        .validate()
        .map_err(|e| Error::validation(format!("Validation failed: {e}")))?;

    if !request.query.contains(vigil_reliability::slo::WINDOW_TOKEN) {
        return Err(Error::validation(
            "query must contain the ${WINDOW} placeholder",
        ));
    }

    state
        .services
        .get(request.service_id)
        .await?
        .ok_or_else(|| Error::not_found("Service not found"))?;

    let slo = state.slos.create(&request).await?;
    Ok((StatusCode::CREATED, Json(slo)).into_response())
}

pub async fn get_slo(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let slo = state
        .slos
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("SLO not found"))?;
    Ok(Json(slo).into_response())
}

pub async fn update_slo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSloRequest>,
) -> Result<Response> {
    if let Some(query) = &request.query {
        if !query.contains(vigil_reliability::slo::WINDOW_TOKEN) {
            return Err(Error::validation(
                "query must contain the ${WINDOW} placeholder",
            ));
        }
    }

    let slo = state
        .slos
        .update(id, &request)
        .await?
        .ok_or_else(|| Error::not_found("SLO not found"))?;
    Ok(Json(slo).into_response())
}

pub async fn delete_slo(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    if !state.slos.delete(id).await? {
        return Err(Error::not_found("SLO not found"));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Runs one on-demand evaluation and returns the updated SLO. Unlike the
/// background tick, upstream failures surface to the caller here.
pub async fn calculate_slo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let slo = state
        .slos
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("SLO not found"))?;

    if !slo.is_enabled() {
        return Err(Error::validation("SLO is disabled"));
    }

    state.evaluator.evaluate_one(&slo).await?;

    let updated = state
        .slos
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("SLO not found"))?;
    Ok(Json(updated).into_response())
}
