use super::{resolve_page, set_pagination_headers, ListParams};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;
use vigil_auth::AuthContext;
use vigil_core::{Error, Result};
use vigil_reliability::correlation::CorrelationRequest;
use vigil_reliability::incident::{
    CreateCommentRequest, CreateIncidentRequest, NewTimelineEvent, UpdateIncidentRequest,
};

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let page = resolve_page(params.limit, params.offset)?;
    let incidents = state
        .incidents
        .list(
            page.limit,
            page.offset,
            params.status.as_deref(),
            params.severity.as_deref(),
        )
        .await?;

    let mut response = Json(incidents).into_response();
    set_pagination_headers(&mut response, page);
    Ok(response)
}

/// Creates the incident, upserting the referenced service, then spawns the
/// correlation pass in the background — the response does not wait for it.
pub async fn create_incident(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<Response> {
    request
        .validate()
        .map_err(|e| Error::validation(format!("Validation failed: {e}")))?;

    let service = state.services.upsert_by_name(&request.service).await?;
    let incident = state.incidents.create(&request, service.id).await?;

    state
        .incidents
        .add_timeline_event(
            incident.id,
            &NewTimelineEvent::new("status_change", "api", "Incident created")
                .with_description(format!("Incident opened against service {}", service.name))
                .with_severity(&incident.severity)
                .with_created_by(&context.username),
        )
        .await?;

    let namespace = request
        .namespace
        .clone()
        .unwrap_or_else(|| state.config.telemetry.default_namespace.clone());

    state.engine.spawn(CorrelationRequest {
        incident_id: incident.id,
        service: service.name.clone(),
        namespace,
        started_at: incident.started_at,
    });

    info!(incident_id = %incident.id, service = %service.name, "Incident created");
    Ok((StatusCode::CREATED, Json(incident)).into_response())
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let incident = state
        .incidents
        .get_with_service(id)
        .await?
        .ok_or_else(|| Error::not_found("Incident not found"))?;
    Ok(Json(incident).into_response())
}

/// Partial update. Resolution metrics (`resolved_at`, `mttr_seconds`,
/// `mtta_seconds`) are derived by the store trigger, not here.
pub async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<UpdateIncidentRequest>,
) -> Result<Response> {
    let before = state
        .incidents
        .get_with_service(id)
        .await?
        .ok_or_else(|| Error::not_found("Incident not found"))?;

    let incident = state
        .incidents
        .update(id, &request)
        .await?
        .ok_or_else(|| Error::not_found("Incident not found"))?;

    if let Some(status) = &request.status {
        if *status != before.status {
            state
                .incidents
                .add_timeline_event(
                    id,
                    &NewTimelineEvent::new("status_change", "api", format!(
                        "Status changed from {} to {}",
                        before.status, status
                    ))
                    .with_severity(&incident.severity)
                    .with_created_by(&context.username),
                )
                .await?;
        }
    }

    Ok(Json(incident).into_response())
}

pub async fn get_timeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    ensure_incident_exists(&state, id).await?;
    let events = state.incidents.timeline(id).await?;
    Ok(Json(events).into_response())
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<Response> {
    request
        .validate()
        .map_err(|e| Error::validation(format!("Validation failed: {e}")))?;
    ensure_incident_exists(&state, id).await?;

    let event = state
        .incidents
        .add_timeline_event(
            id,
            &NewTimelineEvent::new("comment", "api", request.comment.clone())
                .with_created_by(&context.username),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(event)).into_response())
}

pub async fn get_correlations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    ensure_incident_exists(&state, id).await?;
    let correlations = state.incidents.correlations(id).await?;
    Ok(Json(correlations).into_response())
}

/// Re-runs correlation for an incident. The pass runs in the background and
/// replaces the previous correlation rows when it lands.
pub async fn rerun_correlation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let incident = state
        .incidents
        .get_with_service(id)
        .await?
        .ok_or_else(|| Error::not_found("Incident not found"))?;

    let service = incident
        .service_name
        .ok_or_else(|| Error::validation("Incident has no associated service"))?;

    let accepted = state.engine.spawn(CorrelationRequest {
        incident_id: incident.id,
        service,
        namespace: state.config.telemetry.default_namespace.clone(),
        started_at: incident.started_at,
    });
    if !accepted {
        return Err(Error::internal("Correlation engine is shutting down"));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "correlation started" })),
    )
        .into_response())
}

async fn ensure_incident_exists(state: &AppState, id: Uuid) -> Result<()> {
    state
        .incidents
        .get_with_service(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| Error::not_found("Incident not found"))
}
