use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use freightdesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use freightdesk_core::domain::actor::Actor;
use freightdesk_core::domain::sales_task::{
    SalesTask, SalesTaskId, SalesTaskProgress, SalesTaskStage, SalesTaskStatusLog, StatusLogId,
};
use freightdesk_core::pipeline::{StageEvent, StageProgressEngine, StageTransition};

use super::{
    format_timestamp, parse_timestamp, RecordedStage, RepositoryError, SalesTaskRepository,
};
use crate::DbPool;

const ENTITY: &str = "sales task";

pub struct SqlSalesTaskRepository {
    pool: DbPool,
    engine: StageProgressEngine,
    audit_sink: Arc<dyn AuditSink>,
}

impl SqlSalesTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, engine: StageProgressEngine::new(), audit_sink: Arc::new(TracingAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    fn audit_write_failure(
        &self,
        audit: &AuditContext,
        transition: &StageTransition,
        error: &RepositoryError,
    ) {
        self.audit_sink.emit(
            AuditEvent::new(
                audit,
                "sales_task.stage_write_failed",
                AuditCategory::SalesTask,
                AuditOutcome::Failed,
            )
            .with_metadata("stage", transition.entry.status.as_str())
            .with_metadata("sequence", transition.entry.sequence.to_string())
            .with_metadata("error", error.to_string()),
        );
    }
}

#[async_trait::async_trait]
impl SalesTaskRepository for SqlSalesTaskRepository {
    async fn create(&self, task: SalesTask) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sales_task (
                id,
                client_name,
                origin,
                destination,
                commodity,
                notes,
                status,
                archived,
                created_by_name,
                created_by_email,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id.0)
        .bind(&task.client_name)
        .bind(&task.origin)
        .bind(&task.destination)
        .bind(&task.commodity)
        .bind(&task.notes)
        .bind(task.status.as_str())
        .bind(task.archived)
        .bind(&task.created_by.name)
        .bind(&task.created_by.email)
        .bind(format_timestamp(task.created_at))
        .bind(format_timestamp(task.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("sales task `{}` already exists", task.id.0)
            })
        })?;

        for entry in &task.status_logs {
            insert_entry(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &SalesTaskId) -> Result<Option<SalesTask>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_task(&mut conn, id).await
    }

    async fn list(&self, include_archived: bool) -> Result<Vec<SalesTask>, RepositoryError> {
        let task_rows = sqlx::query(
            "SELECT
                id,
                client_name,
                origin,
                destination,
                commodity,
                notes,
                status,
                archived,
                created_by_name,
                created_by_email,
                created_at,
                updated_at
             FROM sales_task
             WHERE ? OR archived = 0
             ORDER BY created_at ASC, id ASC",
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;

        let log_rows = sqlx::query(
            "SELECT
                l.id,
                l.task_id,
                l.sequence,
                l.status,
                l.completed,
                l.comment,
                l.actor_name,
                l.actor_email,
                l.created_at
             FROM sales_task_status_log l
             JOIN sales_task t ON t.id = l.task_id
             WHERE ? OR t.archived = 0
             ORDER BY l.task_id ASC, l.created_at ASC, l.sequence ASC",
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;

        let mut logs_by_task: HashMap<String, Vec<SalesTaskStatusLog>> = HashMap::new();
        for row in &log_rows {
            let entry = entry_from_row(row)?;
            logs_by_task.entry(entry.task_id.0.clone()).or_default().push(entry);
        }

        task_rows
            .iter()
            .map(|row| {
                let id = row.try_get::<String, _>("id")?;
                let logs = logs_by_task.remove(&id).unwrap_or_default();
                task_from_row(row, logs)
            })
            .collect()
    }

    async fn set_archived(
        &self,
        id: &SalesTaskId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<SalesTask, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE sales_task
             SET updated_at = CASE WHEN archived = ?1 THEN updated_at ELSE ?2 END,
                 archived = ?1
             WHERE id = ?3",
        )
        .bind(archived)
        .bind(format_timestamp(now))
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, id.0.clone()));
        }

        let task = load_task(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id.0.clone()))?;
        tx.commit().await?;

        tracing::info!(
            event_name = "sales_task.archived_changed",
            task_id = %id.0,
            archived,
            "sales task archive flag updated"
        );
        Ok(task)
    }

    async fn record_stage_event(
        &self,
        id: &SalesTaskId,
        event: StageEvent,
        now: DateTime<Utc>,
        audit: &AuditContext,
    ) -> Result<RecordedStage, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // A write as the first statement takes the database write lock, so
        // the log read below cannot go stale before the append.
        let locked = sqlx::query("UPDATE sales_task SET updated_at = updated_at WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        if locked.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, id.0.clone()));
        }

        let mut task = load_task(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id.0.clone()))?;
        let transition =
            self.engine.record_with_audit(&task, event, now, self.audit_sink.as_ref(), audit)?;

        let written = match append_transition(&mut tx, &task, &transition).await {
            Ok(()) => tx.commit().await.map_err(RepositoryError::from),
            Err(error) => Err(error),
        };
        if let Err(error) = written {
            self.audit_write_failure(audit, &transition, &error);
            return Err(error);
        }

        let entry = transition.entry.clone();
        task.apply(transition)?;

        tracing::info!(
            event_name = "sales_task.stage_persisted",
            correlation_id = %audit.correlation_id,
            task_id = %task.id.0,
            stage = entry.status.as_str(),
            completed = entry.completed,
            sequence = entry.sequence,
            status = task.status.as_str(),
            "stage event appended"
        );
        Ok(RecordedStage { task, entry })
    }

    async fn list_status_logs(
        &self,
        id: &SalesTaskId,
    ) -> Result<Vec<SalesTaskStatusLog>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let exists = sqlx::query("SELECT 1 FROM sales_task WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::not_found(ENTITY, id.0.clone()));
        }

        load_logs(&mut conn, id).await
    }
}

async fn load_task(
    conn: &mut SqliteConnection,
    id: &SalesTaskId,
) -> Result<Option<SalesTask>, RepositoryError> {
    let row = sqlx::query(
        "SELECT
            id,
            client_name,
            origin,
            destination,
            commodity,
            notes,
            status,
            archived,
            created_by_name,
            created_by_email,
            created_at,
            updated_at
         FROM sales_task
         WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let logs = load_logs(conn, id).await?;
    task_from_row(&row, logs).map(Some)
}

async fn load_logs(
    conn: &mut SqliteConnection,
    id: &SalesTaskId,
) -> Result<Vec<SalesTaskStatusLog>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT
            id,
            task_id,
            sequence,
            status,
            completed,
            comment,
            actor_name,
            actor_email,
            created_at
         FROM sales_task_status_log
         WHERE task_id = ?
         ORDER BY created_at ASC, sequence ASC",
    )
    .bind(&id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &SalesTaskStatusLog,
) -> Result<(), RepositoryError> {
    let sequence = i64::try_from(entry.sequence).map_err(|_| {
        RepositoryError::Decode(format!("sequence {} does not fit in storage", entry.sequence))
    })?;

    sqlx::query(
        "INSERT INTO sales_task_status_log (
            id,
            task_id,
            sequence,
            status,
            completed,
            comment,
            actor_name,
            actor_email,
            created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.task_id.0)
    .bind(sequence)
    .bind(entry.status.as_str())
    .bind(entry.completed)
    .bind(&entry.comment)
    .bind(&entry.actor_name)
    .bind(&entry.actor_email)
    .bind(format_timestamp(entry.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|error| {
        RepositoryError::from_write(error, || {
            format!("sequence {} already recorded for task `{}`", entry.sequence, entry.task_id.0)
        })
    })?;

    Ok(())
}

async fn append_transition(
    conn: &mut SqliteConnection,
    task: &SalesTask,
    transition: &StageTransition,
) -> Result<(), RepositoryError> {
    insert_entry(conn, &transition.entry).await?;

    sqlx::query("UPDATE sales_task SET status = ?, updated_at = ? WHERE id = ?")
        .bind(transition.status.as_str())
        .bind(format_timestamp(task.updated_at.max(transition.entry.created_at)))
        .bind(&task.id.0)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn task_from_row(
    row: &SqliteRow,
    status_logs: Vec<SalesTaskStatusLog>,
) -> Result<SalesTask, RepositoryError> {
    let stored_status_raw = row.try_get::<String, _>("status")?;
    let stored_status = parse_stage("status", &stored_status_raw)?;

    let mut task = SalesTask {
        id: SalesTaskId(row.try_get("id")?),
        client_name: row.try_get("client_name")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        commodity: row.try_get("commodity")?,
        notes: row.try_get("notes")?,
        status: stored_status,
        progress: SalesTaskProgress::new(),
        status_logs,
        archived: row.try_get("archived")?,
        created_by: Actor {
            name: row.try_get("created_by_name")?,
            email: row.try_get("created_by_email")?,
        },
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    };
    task.rebuild();

    if task.status != stored_status {
        tracing::warn!(
            event_name = "sales_task.status_drift",
            task_id = %task.id.0,
            stored = stored_status.as_str(),
            rebuilt = task.status.as_str(),
            "stored status disagrees with the log; using the log"
        );
    }

    Ok(task)
}

fn entry_from_row(row: &SqliteRow) -> Result<SalesTaskStatusLog, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let sequence = row.try_get::<i64, _>("sequence")?;

    Ok(SalesTaskStatusLog {
        id: StatusLogId(row.try_get("id")?),
        task_id: SalesTaskId(row.try_get("task_id")?),
        sequence: u64::try_from(sequence).map_err(|_| {
            RepositoryError::Decode(format!("negative sequence `{sequence}` in status log"))
        })?,
        status: parse_stage("status", &status_raw)?,
        completed: row.try_get("completed")?,
        comment: row.try_get("comment")?,
        actor_name: row.try_get("actor_name")?,
        actor_email: row.try_get("actor_email")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_stage(column: &str, value: &str) -> Result<SalesTaskStage, RepositoryError> {
    SalesTaskStage::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown stage in `{column}`: `{value}`")))
}
