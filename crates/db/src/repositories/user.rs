use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use freightdesk_core::domain::user::{User, UserId, UserRole};

use super::{format_timestamp, parse_timestamp, RepositoryError, UserRepository};
use crate::DbPool;

const ENTITY: &str = "user";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, email, role, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(format_timestamp(user.created_at))
        .bind(format_timestamp(user.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("a user with email `{}` already exists", user.email)
            })
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, role, active, created_at, updated_at
             FROM app_user
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, role, active, created_at, updated_at
             FROM app_user
             ORDER BY name ASC, email ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn set_active(
        &self,
        id: &UserId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id.0.clone()))?;
        user.set_active(active, now);

        sqlx::query("UPDATE app_user SET active = ?, updated_at = ? WHERE id = ?")
            .bind(user.active)
            .bind(format_timestamp(user.updated_at))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = UserRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown user role `{role_raw}`")))?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role,
        active: row.try_get("active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
