use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use freightdesk_core::audit::AuditCategory;
use freightdesk_core::domain::company::{CompanyProfile, CompanyProfileUpdate};
use freightdesk_core::errors::ApplicationError;

use crate::api::{ApiError, AppState, RequestContext};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/company-profile", get(get_profile).put(save_profile))
}

async fn get_profile(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<CompanyProfile>, ApiError> {
    let profile = state
        .company
        .get()
        .await
        .map_err(|error| context.fail(error))?
        .ok_or_else(|| {
            context.fail(ApplicationError::NotFound {
                entity: "company profile",
                id: "default".to_owned(),
            })
        })?;
    Ok(Json(profile))
}

async fn save_profile(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<CompanyProfileUpdate>, JsonRejection>,
) -> Result<Json<CompanyProfile>, ApiError> {
    let update = context.body(payload)?;
    let profile =
        update.into_profile(&context.actor, Utc::now()).map_err(|error| context.fail(error))?;

    state.company.save(profile.clone()).await.map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        "company_profile",
        "company.profile_saved",
        AuditCategory::Company,
        &[("name", profile.name.as_str())],
    );
    Ok(Json(profile))
}
