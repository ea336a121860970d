//! Master-data lookups. `{kind}` accepts URL-friendly forms such as
//! `container-types` or `ports`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use freightdesk_core::audit::AuditCategory;
use freightdesk_core::domain::lookup::{LookupEntry, LookupId, LookupKind, NewLookupEntry};
use freightdesk_core::errors::DomainError;
use serde::Deserialize;

use crate::api::{new_id, ApiError, AppState, RequestContext};

#[derive(Debug, Default, Deserialize)]
pub struct LookupParams {
    #[serde(default)]
    pub include_inactive: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/lookups", get(list_kinds))
        .route("/api/v1/lookups/{kind}", get(list_entries).post(create_entry))
        .route("/api/v1/lookups/{kind}/{id}/deactivate", post(deactivate_entry))
        .route("/api/v1/lookups/{kind}/{id}/activate", post(activate_entry))
}

fn parse_kind(context: &RequestContext, raw: &str) -> Result<LookupKind, ApiError> {
    LookupKind::parse(raw).ok_or_else(|| {
        context.fail(DomainError::validation("kind", format!("unknown lookup kind `{raw}`")))
    })
}

async fn list_kinds() -> Json<Vec<LookupKind>> {
    Json(LookupKind::ALL.to_vec())
}

async fn list_entries(
    State(state): State<AppState>,
    context: RequestContext,
    Path(kind): Path<String>,
    params: Result<Query<LookupParams>, QueryRejection>,
) -> Result<Json<Vec<LookupEntry>>, ApiError> {
    let kind = parse_kind(&context, &kind)?;
    let params = context.query(params)?;
    let entries = state
        .lookups
        .list_by_kind(kind, !params.include_inactive)
        .await
        .map_err(|error| context.fail(error))?;
    Ok(Json(entries))
}

async fn create_entry(
    State(state): State<AppState>,
    context: RequestContext,
    Path(kind): Path<String>,
    payload: Result<Json<NewLookupEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<LookupEntry>), ApiError> {
    let kind = parse_kind(&context, &kind)?;
    let input = context.body(payload)?;
    let entry = LookupEntry::create(LookupId(new_id("LK")), kind, input, Utc::now())
        .map_err(|error| context.fail(error))?;

    state.lookups.create(entry.clone()).await.map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        &entry.id.0,
        "lookup.created",
        AuditCategory::MasterData,
        &[("kind", kind.as_str()), ("code", entry.code.as_str())],
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn deactivate_entry(
    state: State<AppState>,
    context: RequestContext,
    path: Path<(String, String)>,
) -> Result<Json<LookupEntry>, ApiError> {
    toggle(state, context, path, false).await
}

async fn activate_entry(
    state: State<AppState>,
    context: RequestContext,
    path: Path<(String, String)>,
) -> Result<Json<LookupEntry>, ApiError> {
    toggle(state, context, path, true).await
}

async fn toggle(
    State(state): State<AppState>,
    context: RequestContext,
    Path((kind, id)): Path<(String, String)>,
    active: bool,
) -> Result<Json<LookupEntry>, ApiError> {
    let kind = parse_kind(&context, &kind)?;
    let entry = state
        .lookups
        .set_active(kind, &LookupId(id), active)
        .await
        .map_err(|error| context.fail(error))?;

    let event_type = if active { "lookup.activated" } else { "lookup.deactivated" };
    context.emit(
        state.audit.as_ref(),
        &entry.id.0,
        event_type,
        AuditCategory::MasterData,
        &[("kind", kind.as_str()), ("code", entry.code.as_str())],
    );
    Ok(Json(entry))
}
