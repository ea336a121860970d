use freightdesk_core::config::{AppConfig, ConfigError};
use freightdesk_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(
    options: freightdesk_core::config::LoadOptions,
) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use freightdesk_core::config::{ConfigOverrides, LoadOptions};
    use serde_json::json;

    use crate::api::{router, test_support::send, AppState};
    use crate::bootstrap::{bootstrap, BootstrapError};

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_urls() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/freightdesk".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }

    #[tokio::test]
    async fn bootstrap_applies_the_baseline_schema() {
        let app = bootstrap(memory_options()).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('sales_task', 'sales_task_status_log', 'quotation')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(table_count, 3);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn sql_backed_router_records_stage_progress() {
        let app = bootstrap(memory_options()).await.expect("bootstrap");
        let api = router(AppState::sql(app.db_pool.clone()));
        let alice = Some(("Alice", "alice@forwarder.test"));

        let (status, task) = send(
            &api,
            "POST",
            "/api/v1/sales-tasks",
            alice,
            Some(json!({ "client_name": "Anatolia Textiles" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = task["id"].as_str().expect("task id").to_owned();
        let stages = format!("/api/v1/sales-tasks/{id}/stages");

        for stage in ["MEET", "CONTACT_BY_PHONE"] {
            let body = json!({ "stage": stage, "completed": true });
            let (status, _) = send(&api, "POST", &stages, alice, Some(body)).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _) = send(
            &api,
            "POST",
            &stages,
            None,
            Some(json!({ "stage": "MEETING_DATE", "completed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, task) = send(&api, "GET", &format!("/api/v1/sales-tasks/{id}"), None, None).await;
        assert_eq!(task["status"], "CONTACT_BY_PHONE");
        assert_eq!(task["progress"]["MEET"]["completed_by_name"], "Alice");

        let (_, logs) =
            send(&api, "GET", &format!("/api/v1/sales-tasks/{id}/logs"), None, None).await;
        let sequences: Vec<i64> = logs
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|log| log["sequence"].as_i64())
            .collect();
        assert_eq!(sequences, vec![1, 2]);

        app.db_pool.close().await;
    }
}
