use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use freightdesk_core::domain::actor::Actor;
use freightdesk_core::domain::quotation::{Quotation, QuotationId, QuotationStatus};

use super::{format_timestamp, parse_timestamp, QuotationRepository, RepositoryError};
use crate::DbPool;

const ENTITY: &str = "quotation";

pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn create(&self, quotation: Quotation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO quotation (
                id,
                reference,
                client_name,
                origin,
                destination,
                commodity,
                amount,
                currency,
                status,
                created_by_name,
                created_by_email,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quotation.id.0)
        .bind(&quotation.reference)
        .bind(&quotation.client_name)
        .bind(&quotation.origin)
        .bind(&quotation.destination)
        .bind(&quotation.commodity)
        .bind(quotation.amount.map(|amount| amount.to_string()))
        .bind(&quotation.currency)
        .bind(quotation.status.as_str())
        .bind(&quotation.created_by.name)
        .bind(&quotation.created_by.email)
        .bind(format_timestamp(quotation.created_at))
        .bind(format_timestamp(quotation.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("quotation reference `{}` is already in use", quotation.reference)
            })
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                reference,
                client_name,
                origin,
                destination,
                commodity,
                amount,
                currency,
                status,
                created_by_name,
                created_by_email,
                created_at,
                updated_at
             FROM quotation
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(quotation_from_row).transpose()
    }

    async fn list(
        &self,
        status: Option<QuotationStatus>,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                reference,
                client_name,
                origin,
                destination,
                commodity,
                amount,
                currency,
                status,
                created_by_name,
                created_by_email,
                created_at,
                updated_at
             FROM quotation
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at DESC, reference ASC",
        )
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(quotation_from_row).collect()
    }

    async fn update_status(
        &self,
        id: &QuotationId,
        raw_status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Quotation, RepositoryError> {
        let mut quotation = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id.0.clone()))?;
        let previous = quotation.status;
        let status = quotation.set_status(raw_status, now);

        let updated = sqlx::query("UPDATE quotation SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_timestamp(quotation.updated_at))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, id.0.clone()));
        }

        tracing::info!(
            event_name = "quotation.status_changed",
            quotation_id = %id.0,
            raw_status = raw_status.unwrap_or(""),
            from = previous.as_str(),
            to = status.as_str(),
            "quotation status updated"
        );
        Ok(quotation)
    }
}

fn quotation_from_row(row: &SqliteRow) -> Result<Quotation, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = QuotationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown quotation status `{status_raw}`"))
    })?;
    let amount = row
        .try_get::<Option<String>, _>("amount")?
        .map(|raw| {
            Decimal::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid amount `{raw}` ({error})"))
            })
        })
        .transpose()?;

    Ok(Quotation {
        id: QuotationId(row.try_get("id")?),
        reference: row.try_get("reference")?,
        client_name: row.try_get("client_name")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        commodity: row.try_get("commodity")?,
        amount,
        currency: row.try_get("currency")?,
        status,
        created_by: Actor {
            name: row.try_get("created_by_name")?,
            email: row.try_get("created_by_email")?,
        },
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
