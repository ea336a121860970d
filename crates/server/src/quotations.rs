//! Quotation endpoints and the status classifier.

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
use freightdesk_core::domain::quotation::{
    NewQuotation, Quotation, QuotationClassification, QuotationId, QuotationStatus,
};
use freightdesk_core::errors::ApplicationError;
use serde::{Deserialize, Serialize};

use crate::api::{new_id, ApiError, AppState, RequestContext};

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuotationView {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub classification: QuotationClassification,
}

impl From<Quotation> for QuotationView {
    fn from(quotation: Quotation) -> Self {
        let classification = quotation.classification();
        Self { quotation, classification }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/quotations", get(list_quotations).post(create_quotation))
        .route("/api/v1/quotations/{id}", get(get_quotation))
        .route("/api/v1/quotations/{id}/status", post(update_status))
        .route("/api/v1/quotation-statuses", get(list_statuses))
        .route("/api/v1/quotation-statuses/classify", get(classify_status))
}

async fn list_quotations(
    State(state): State<AppState>,
    context: RequestContext,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Json<Vec<QuotationView>>, ApiError> {
    let params = context.query(params)?;
    let filter = params
        .status
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| QuotationStatus::normalize(Some(raw)));

    let quotations = state.quotations.list(filter).await.map_err(|error| context.fail(error))?;
    Ok(Json(quotations.into_iter().map(QuotationView::from).collect()))
}

async fn create_quotation(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<NewQuotation>, JsonRejection>,
) -> Result<(StatusCode, Json<QuotationView>), ApiError> {
    let input = context.body(payload)?;
    let quotation =
        Quotation::create(QuotationId(new_id("QT")), input, context.actor.clone(), Utc::now())
            .map_err(|error| context.fail(error))?;

    state.quotations.create(quotation.clone()).await.map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        &quotation.id.0,
        "quotation.created",
        AuditCategory::Quotation,
        &[("reference", quotation.reference.as_str()), ("status", quotation.status.as_str())],
    );
    Ok((StatusCode::CREATED, Json(quotation.into())))
}

async fn get_quotation(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<QuotationView>, ApiError> {
    let quotation = state
        .quotations
        .find_by_id(&QuotationId(id.clone()))
        .await
        .map_err(|error| context.fail(error))?
        .ok_or_else(|| context.fail(ApplicationError::NotFound { entity: "quotation", id }))?;
    Ok(Json(quotation.into()))
}

async fn update_status(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<QuotationView>, ApiError> {
    let request = context.body(payload)?;
    let quotation = state
        .quotations
        .update_status(&QuotationId(id), request.status.as_deref(), Utc::now())
        .await
        .map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        &quotation.id.0,
        "quotation.status_changed",
        AuditCategory::Quotation,
        &[
            ("requested", request.status.as_deref().unwrap_or("")),
            ("status", quotation.status.as_str()),
        ],
    );
    Ok(Json(quotation.into()))
}

async fn list_statuses() -> Json<Vec<QuotationClassification>> {
    Json(QuotationStatus::ALL.into_iter().map(QuotationStatus::classify).collect())
}

async fn classify_status(
    context: RequestContext,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Json<QuotationClassification>, ApiError> {
    let params = context.query(params)?;
    Ok(Json(QuotationStatus::normalize(params.status.as_deref()).classify()))
}
