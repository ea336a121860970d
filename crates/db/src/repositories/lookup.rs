use sqlx::{sqlite::SqliteRow, Row};

use freightdesk_core::domain::lookup::{LookupEntry, LookupId, LookupKind};

use super::{format_timestamp, parse_timestamp, LookupRepository, RepositoryError};
use crate::DbPool;

const ENTITY: &str = "lookup entry";

pub struct SqlLookupRepository {
    pool: DbPool,
}

impl SqlLookupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LookupRepository for SqlLookupRepository {
    async fn create(&self, entry: LookupEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO lookup_entry (id, kind, code, name, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(entry.kind.as_str())
        .bind(&entry.code)
        .bind(&entry.name)
        .bind(entry.active)
        .bind(format_timestamp(entry.created_at))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("{} `{}` already exists", entry.kind.as_str(), entry.code)
            })
        })?;

        Ok(())
    }

    async fn list_by_kind(
        &self,
        kind: LookupKind,
        active_only: bool,
    ) -> Result<Vec<LookupEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, kind, code, name, active, created_at
             FROM lookup_entry
             WHERE kind = ? AND (active = 1 OR NOT ?)
             ORDER BY code ASC",
        )
        .bind(kind.as_str())
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn set_active(
        &self,
        kind: LookupKind,
        id: &LookupId,
        active: bool,
    ) -> Result<LookupEntry, RepositoryError> {
        let updated = sqlx::query("UPDATE lookup_entry SET active = ? WHERE id = ? AND kind = ?")
            .bind(active)
            .bind(&id.0)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, id.0.clone()));
        }

        let row = sqlx::query(
            "SELECT id, kind, code, name, active, created_at FROM lookup_entry WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_one(&self.pool)
        .await?;

        entry_from_row(&row)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LookupEntry, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = LookupKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lookup kind `{kind_raw}`")))?;

    Ok(LookupEntry {
        id: LookupId(row.try_get("id")?),
        kind,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use freightdesk_core::domain::lookup::{LookupEntry, LookupId, LookupKind, NewLookupEntry};

    use super::SqlLookupRepository;
    use crate::repositories::{LookupRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn entry(id: &str, kind: LookupKind, code: &str, name: &str) -> LookupEntry {
        LookupEntry::create(
            LookupId(id.to_owned()),
            kind,
            NewLookupEntry { code: code.to_owned(), name: name.to_owned() },
            Utc::now(),
        )
        .expect("valid entry")
    }

    #[tokio::test]
    async fn codes_are_unique_per_kind_only() {
        let repo = SqlLookupRepository::new(setup_pool().await);
        repo.create(entry("L-1", LookupKind::Country, "tr", "Turkey")).await.expect("country");
        repo.create(entry("L-2", LookupKind::Currency, "TRY", "Turkish lira"))
            .await
            .expect("currency");
        repo.create(entry("L-3", LookupKind::Port, "TR", "Tripoli"))
            .await
            .expect("same code, other kind");

        let error = repo
            .create(entry("L-4", LookupKind::Country, "TR", "Türkiye"))
            .await
            .expect_err("duplicate code");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivated_entries_drop_out_of_active_listing() {
        let repo = SqlLookupRepository::new(setup_pool().await);
        repo.create(entry("L-1", LookupKind::Incoterm, "FOB", "Free on board")).await.expect("fob");
        repo.create(entry("L-2", LookupKind::Incoterm, "CIF", "Cost, insurance and freight"))
            .await
            .expect("cif");

        let deactivated = repo
            .set_active(LookupKind::Incoterm, &LookupId("L-1".to_owned()), false)
            .await
            .expect("deactivate");
        assert!(!deactivated.active);

        let active = repo.list_by_kind(LookupKind::Incoterm, true).await.expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "CIF");

        let all = repo.list_by_kind(LookupKind::Incoterm, false).await.expect("all");
        let codes: Vec<&str> = all.iter().map(|entry| entry.code.as_str()).collect();
        assert_eq!(codes, vec!["CIF", "FOB"]);

        let wrong_kind =
            repo.set_active(LookupKind::Port, &LookupId("L-2".to_owned()), false).await;
        assert!(matches!(wrong_kind, Err(RepositoryError::NotFound { .. })));
    }
}
