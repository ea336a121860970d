//! Sales task endpoints.
//!
//! - `GET  /api/v1/sales-tasks?include_archived=bool`
//! - `POST /api/v1/sales-tasks`
//! - `GET  /api/v1/sales-tasks/{id}`
//! - `POST /api/v1/sales-tasks/{id}/stages`
//! - `GET  /api/v1/sales-tasks/{id}/logs`
//! - `POST /api/v1/sales-tasks/{id}/archive`

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
use freightdesk_core::domain::sales_task::{
    NewSalesTask, SalesTask, SalesTaskId, SalesTaskStatusLog,
};
use freightdesk_core::errors::ApplicationError;
use freightdesk_core::pipeline::StageEvent;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{new_id, ApiError, AppState, RequestContext};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub stage: String,
    pub completed: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageRecordedResponse {
    pub task: SalesTask,
    pub entry: SalesTaskStatusLog,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/sales-tasks", get(list_tasks).post(create_task))
        .route("/api/v1/sales-tasks/{id}", get(get_task))
        .route("/api/v1/sales-tasks/{id}/stages", post(record_stage))
        .route("/api/v1/sales-tasks/{id}/logs", get(list_logs))
        .route("/api/v1/sales-tasks/{id}/archive", post(archive_task))
}

async fn list_tasks(
    State(state): State<AppState>,
    context: RequestContext,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<SalesTask>>, ApiError> {
    let params = context.query(params)?;
    let tasks = state
        .sales_tasks
        .list(params.include_archived)
        .await
        .map_err(|error| context.fail(error))?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<NewSalesTask>, JsonRejection>,
) -> Result<(StatusCode, Json<SalesTask>), ApiError> {
    let input = context.body(payload)?;
    let task = SalesTask::open(
        SalesTaskId(new_id("ST")),
        input,
        context.actor.clone(),
        Utc::now(),
    )
    .map_err(|error| context.fail(error))?;

    state.sales_tasks.create(task.clone()).await.map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        &task.id.0,
        "sales_task.created",
        AuditCategory::SalesTask,
        &[("client_name", task.client_name.as_str())],
    );
    info!(
        event_name = "api.sales_task.created",
        correlation_id = %context.correlation_id,
        task_id = %task.id.0,
        "sales task created"
    );
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<SalesTask>, ApiError> {
    let task = state
        .sales_tasks
        .find_by_id(&SalesTaskId(id.clone()))
        .await
        .map_err(|error| context.fail(error))?
        .ok_or_else(|| context.fail(ApplicationError::NotFound { entity: "sales task", id }))?;
    Ok(Json(task))
}

async fn record_stage(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<StageRequest>, JsonRejection>,
) -> Result<Json<StageRecordedResponse>, ApiError> {
    let request = context.body(payload)?;
    let event = StageEvent {
        stage: request.stage,
        completed: request.completed,
        comment: request.comment,
        actor: context.actor.clone(),
    };

    let recorded = state
        .sales_tasks
        .record_stage_event(&SalesTaskId(id.clone()), event, Utc::now(), &context.audit(Some(&id)))
        .await
        .map_err(|error| context.fail(error))?;

    Ok(Json(StageRecordedResponse { task: recorded.task, entry: recorded.entry }))
}

async fn list_logs(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Vec<SalesTaskStatusLog>>, ApiError> {
    let logs = state
        .sales_tasks
        .list_status_logs(&SalesTaskId(id))
        .await
        .map_err(|error| context.fail(error))?;
    Ok(Json(logs))
}

async fn archive_task(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<SalesTask>, ApiError> {
    let task = state
        .sales_tasks
        .set_archived(&SalesTaskId(id), true, Utc::now())
        .await
        .map_err(|error| context.fail(error))?;

    context.emit(
        state.audit.as_ref(),
        &task.id.0,
        "sales_task.archived",
        AuditCategory::SalesTask,
        &[],
    );
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_support::{app, send};

    const ALICE: Option<(&str, &str)> = Some(("Alice", "alice@forwarder.test"));

    async fn create(app: &axum::Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/sales-tasks",
            ALICE,
            Some(json!({ "client_name": "Anatolia Textiles", "origin": "Izmir" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().expect("task id").to_owned()
    }

    #[tokio::test]
    async fn new_task_starts_with_five_pending_stages() {
        let (app, sink) = app();
        let id = create(&app).await;

        let (status, body) =
            send(&app, "GET", &format!("/api/v1/sales-tasks/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "MEET");
        let progress = body["progress"].as_object().expect("progress object");
        assert_eq!(progress.len(), 5);
        for stage in ["MEET", "CONTACT_BY_PHONE", "MEETING_DATE", "GIVE_INFO", "CONTRACT"] {
            assert!(progress.contains_key(stage), "missing stage {stage}");
        }
        assert!(progress.values().all(|stage| stage["completed"] == false
            && stage["completed_at"].is_null()
            && stage["completed_by_name"].is_null()));
        assert_eq!(sink.events()[0].event_type, "sales_task.created");
    }

    #[tokio::test]
    async fn recording_stages_moves_overall_status() {
        let (app, _) = app();
        let id = create(&app).await;
        let uri = format!("/api/v1/sales-tasks/{id}/stages");

        let (status, body) = send(
            &app,
            "POST",
            &uri,
            ALICE,
            Some(json!({ "stage": "MEET", "completed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entry"]["sequence"], 1);

        let (_, body) = send(
            &app,
            "POST",
            &uri,
            Some(("Bob", "bob@forwarder.test")),
            Some(json!({ "stage": "contact_by_phone", "completed": true, "comment": "called" })),
        )
        .await;
        assert_eq!(body["task"]["status"], "CONTACT_BY_PHONE");
        assert_eq!(body["task"]["progress"]["CONTACT_BY_PHONE"]["completed_by_name"], "Bob");

        let (status, logs) =
            send(&app, "GET", &format!("/api/v1/sales-tasks/{id}/logs"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.as_array().map(Vec::len), Some(2));
        assert_eq!(logs[1]["comment"], "called");
    }

    #[tokio::test]
    async fn invalid_stage_and_missing_actor_are_bad_requests() {
        let (app, _) = app();
        let id = create(&app).await;
        let uri = format!("/api/v1/sales-tasks/{id}/stages");

        let (status, body) = send(
            &app,
            "POST",
            &uri,
            ALICE,
            Some(json!({ "stage": "NEGOTIATE", "completed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("NEGOTIATE"));

        let (status, body) =
            send(&app, "POST", &uri, None, Some(json!({ "stage": "MEET", "completed": true })))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("actor"));

        let (status, _) = send(&app, "POST", &uri, ALICE, Some(json!({ "stage": "MEET" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, logs) =
            send(&app, "GET", &format!("/api/v1/sales-tasks/{id}/logs"), None, None).await;
        assert_eq!(logs.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (app, _) = app();

        let (status, body) = send(&app, "GET", "/api/v1/sales-tasks/ST-404", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap_or_default().contains("ST-404"));

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/sales-tasks/ST-404/stages",
            ALICE,
            Some(json!({ "stage": "MEET", "completed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn creating_a_task_needs_an_owner() {
        let (app, _) = app();

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/sales-tasks",
            None,
            Some(json!({ "client_name": "Anatolia Textiles" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn archived_tasks_leave_the_default_listing() {
        let (app, _) = app();
        let id = create(&app).await;
        create(&app).await;

        let (status, body) =
            send(&app, "POST", &format!("/api/v1/sales-tasks/{id}/archive"), ALICE, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["archived"], true);

        let (_, listed) = send(&app, "GET", "/api/v1/sales-tasks", None, None).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let (_, all) =
            send(&app, "GET", "/api/v1/sales-tasks?include_archived=true", None, None).await;
        assert_eq!(all.as_array().map(Vec::len), Some(2));
    }
}
