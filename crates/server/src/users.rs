use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use freightdesk_core::audit::AuditCategory;
use freightdesk_core::domain::user::{NewUser, User, UserId};
use freightdesk_core::errors::ApplicationError;

use crate::api::{new_id, ApiError, AppState, RequestContext};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users", get(list_users).post(create_user))
        .route("/api/v1/users/{id}", get(get_user))
        .route("/api/v1/users/{id}/deactivate", post(deactivate_user))
        .route("/api/v1/users/{id}/activate", post(activate_user))
}

async fn list_users(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.users.list().await.map_err(|error| context.fail(error))?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let input = context.body(payload)?;
    let user = User::register(UserId(new_id("USR")), input, Utc::now())
        .map_err(|error| context.fail(error))?;

    state.users.create(user.clone()).await.map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        &user.id.0,
        "user.created",
        AuditCategory::User,
        &[("email", user.email.as_str()), ("role", user.role.as_str())],
    );
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .users
        .find_by_id(&UserId(id.clone()))
        .await
        .map_err(|error| context.fail(error))?
        .ok_or_else(|| context.fail(ApplicationError::NotFound { entity: "user", id }))?;
    Ok(Json(user))
}

async fn deactivate_user(
    state: State<AppState>,
    context: RequestContext,
    id: Path<String>,
) -> Result<Json<User>, ApiError> {
    toggle(state, context, id, false).await
}

async fn activate_user(
    state: State<AppState>,
    context: RequestContext,
    id: Path<String>,
) -> Result<Json<User>, ApiError> {
    toggle(state, context, id, true).await
}

async fn toggle(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
    active: bool,
) -> Result<Json<User>, ApiError> {
    let user = state
        .users
        .set_active(&UserId(id), active, Utc::now())
        .await
        .map_err(|error| context.fail(error))?;

    let event_type = if active { "user.activated" } else { "user.deactivated" };
    context.emit(state.audit.as_ref(), &user.id.0, event_type, AuditCategory::User, &[]);
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_support::{app, send};

    const ADMIN: Option<(&str, &str)> = Some(("Admin", "admin@forwarder.test"));

    #[tokio::test]
    async fn register_list_and_deactivate() {
        let (app, sink) = app();

        let (status, user) = send(
            &app,
            "POST",
            "/api/v1/users",
            ADMIN,
            Some(json!({
                "name": "Dana Ops",
                "email": "Dana@Forwarder.Test",
                "role": "operations"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["email"], "dana@forwarder.test");
        assert_eq!(user["role"], "OPERATIONS");
        let id = user["id"].as_str().expect("user id").to_owned();

        let (status, user) =
            send(&app, "POST", &format!("/api/v1/users/{id}/deactivate"), ADMIN, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["active"], false);

        let (_, listed) = send(&app, "GET", "/api/v1/users", None, None).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
        assert_eq!(listed[0]["active"], false);

        let event_types: Vec<String> =
            sink.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(event_types, vec!["user.created", "user.deactivated"]);
    }

    #[tokio::test]
    async fn invalid_and_duplicate_users_are_rejected() {
        let (app, _) = app();
        let dana = json!({ "name": "Dana", "email": "dana@forwarder.test", "role": "SALES" });

        let (status, _) = send(&app, "POST", "/api/v1/users", ADMIN, Some(dana.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/v1/users", ADMIN, Some(dana)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/users",
            ADMIN,
            Some(json!({ "name": "Eve", "email": "eve@forwarder.test", "role": "root" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("role"));

        let (status, _) =
            send(&app, "POST", "/api/v1/users/USR-404/activate", ADMIN, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
