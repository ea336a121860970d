use sqlx::Row;

use freightdesk_core::domain::company::CompanyProfile;

use super::{format_timestamp, parse_timestamp, CompanyProfileRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCompanyProfileRepository {
    pool: DbPool,
}

impl SqlCompanyProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CompanyProfileRepository for SqlCompanyProfileRepository {
    async fn get(&self) -> Result<Option<CompanyProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT name, address, phone, email, tax_id, website, updated_at, updated_by
             FROM company_profile
             WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CompanyProfile {
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            tax_id: row.try_get("tax_id")?,
            website: row.try_get("website")?,
            updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
            updated_by: row.try_get("updated_by")?,
        }))
    }

    async fn save(&self, profile: CompanyProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company_profile (
                id, name, address, phone, email, tax_id, website, updated_at, updated_by
             ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                phone = excluded.phone,
                email = excluded.email,
                tax_id = excluded.tax_id,
                website = excluded.website,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
        )
        .bind(&profile.name)
        .bind(&profile.address)
        .bind(&profile.phone)
        .bind(&profile.email)
        .bind(&profile.tax_id)
        .bind(&profile.website)
        .bind(format_timestamp(profile.updated_at))
        .bind(&profile.updated_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
