use chrono::Utc;
use freightdesk_core::domain::actor::Actor;
use freightdesk_core::domain::company::CompanyProfileUpdate;
use freightdesk_core::domain::lookup::{LookupEntry, LookupId, LookupKind, NewLookupEntry};
use freightdesk_db::repositories::{
    CompanyProfileRepository, LookupRepository, SqlCompanyProfileRepository, SqlLookupRepository,
};
use freightdesk_db::{DbPool, RepositoryError};

use crate::commands::{load_config, open_database, runtime, CommandResult, EXIT_SEED};

const DEFAULT_LOOKUPS: &[(LookupKind, &str, &str)] = &[
    (LookupKind::Port, "TRMER", "Mersin"),
    (LookupKind::Port, "TRIZM", "Izmir"),
    (LookupKind::Port, "NLRTM", "Rotterdam"),
    (LookupKind::Port, "DEHAM", "Hamburg"),
    (LookupKind::Port, "CNSHA", "Shanghai"),
    (LookupKind::Country, "TR", "Turkey"),
    (LookupKind::Country, "NL", "Netherlands"),
    (LookupKind::Country, "DE", "Germany"),
    (LookupKind::Country, "CN", "China"),
    (LookupKind::Currency, "USD", "US Dollar"),
    (LookupKind::Currency, "EUR", "Euro"),
    (LookupKind::Currency, "TRY", "Turkish Lira"),
    (LookupKind::ContainerType, "20DC", "20ft Dry Container"),
    (LookupKind::ContainerType, "40DC", "40ft Dry Container"),
    (LookupKind::ContainerType, "40HC", "40ft High Cube"),
    (LookupKind::Incoterm, "EXW", "Ex Works"),
    (LookupKind::Incoterm, "FOB", "Free on Board"),
    (LookupKind::Incoterm, "CIF", "Cost, Insurance and Freight"),
    (LookupKind::Incoterm, "DAP", "Delivered at Place"),
    (LookupKind::Commodity, "GENERAL", "General Cargo"),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub lookups_created: usize,
    pub lookups_existing: usize,
    pub company_profile_created: bool,
}

impl SeedSummary {
    pub fn message(&self) -> String {
        format!(
            "lookups: {} created, {} already present; company profile {}",
            self.lookups_created,
            self.lookups_existing,
            if self.company_profile_created { "created" } else { "kept" }
        )
    }
}

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let summary = seed_defaults(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED));
        pool.close().await;
        summary
    });

    match result {
        Ok(summary) => CommandResult::success("seed", summary.message()),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

/// Inserts the default master data. Entries whose code already exists are
/// left untouched, as is an existing company profile.
pub async fn seed_defaults(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let lookups = SqlLookupRepository::new(pool.clone());
    let company = SqlCompanyProfileRepository::new(pool.clone());
    let now = Utc::now();
    let mut summary = SeedSummary::default();

    for (kind, code, name) in DEFAULT_LOOKUPS {
        let entry = LookupEntry::create(
            LookupId(format!("LK-{}-{code}", kind.as_str())),
            *kind,
            NewLookupEntry { code: (*code).to_owned(), name: (*name).to_owned() },
            now,
        )?;
        match lookups.create(entry).await {
            Ok(()) => summary.lookups_created += 1,
            Err(RepositoryError::Conflict(_)) => summary.lookups_existing += 1,
            Err(error) => return Err(error),
        }
    }

    if company.get().await?.is_none() {
        let profile = CompanyProfileUpdate {
            name: "Freightdesk Logistics".to_owned(),
            ..CompanyProfileUpdate::default()
        }
        .into_profile(&Actor::named("freightdesk seed"), now)?;
        company.save(profile).await?;
        summary.company_profile_created = true;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use freightdesk_core::domain::lookup::LookupKind;
    use freightdesk_db::repositories::{
        CompanyProfileRepository, LookupRepository, SqlCompanyProfileRepository,
        SqlLookupRepository,
    };
    use freightdesk_db::{connect_with_settings, migrations};

    use super::{seed_defaults, DEFAULT_LOOKUPS};

    #[tokio::test]
    async fn seeding_twice_creates_nothing_new() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = seed_defaults(&pool).await.expect("first seed");
        assert_eq!(first.lookups_created, DEFAULT_LOOKUPS.len());
        assert!(first.company_profile_created);

        let second = seed_defaults(&pool).await.expect("second seed");
        assert_eq!(second.lookups_created, 0);
        assert_eq!(second.lookups_existing, DEFAULT_LOOKUPS.len());
        assert!(!second.company_profile_created);

        let ports = SqlLookupRepository::new(pool.clone())
            .list_by_kind(LookupKind::Port, true)
            .await
            .expect("ports");
        assert_eq!(ports.len(), 5);
        let profile = SqlCompanyProfileRepository::new(pool.clone()).get().await.expect("get");
        assert_eq!(profile.map(|profile| profile.name).as_deref(), Some("Freightdesk Logistics"));
    }
}
