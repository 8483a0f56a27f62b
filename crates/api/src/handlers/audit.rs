use super::{resolve_page, set_pagination_headers, ListParams};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use vigil_core::Result;

/// Admin-only audit trail listing, newest first.
pub async fn list_audit_log(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let page = resolve_page(params.limit, params.offset)?;
    let records = state.audit.recent(page.limit, page.offset).await?;

    let mut response = Json(records).into_response();
    set_pagination_headers(&mut response, page);
    Ok(response)
}
