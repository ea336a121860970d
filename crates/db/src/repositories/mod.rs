use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use freightdesk_core::audit::AuditContext;
use freightdesk_core::domain::company::CompanyProfile;
use freightdesk_core::domain::lookup::{LookupEntry, LookupId, LookupKind};
use freightdesk_core::domain::quotation::{Quotation, QuotationId, QuotationStatus};
use freightdesk_core::domain::sales_task::{SalesTask, SalesTaskId, SalesTaskStatusLog};
use freightdesk_core::domain::user::{User, UserId};
use freightdesk_core::errors::{ApplicationError, DomainError};
use freightdesk_core::pipeline::StageEvent;

pub mod company;
pub mod lookup;
pub mod memory;
pub mod quotation;
pub mod sales_task;
pub mod user;

pub use company::SqlCompanyProfileRepository;
pub use lookup::SqlLookupRepository;
pub use memory::{
    InMemoryCompanyProfileRepository, InMemoryLookupRepository, InMemoryQuotationRepository,
    InMemorySalesTaskRepository, InMemoryUserRepository,
};
pub use quotation::SqlQuotationRepository;
pub use sales_task::SqlSalesTaskRepository;
pub use user::SqlUserRepository;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Pool exhaustion, I/O failures and SQLite BUSY/LOCKED may succeed on
    /// retry; corrupt rows and other database errors will not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(
                sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Io(_)
                | sqlx::Error::WorkerCrashed,
            ) => true,
            Self::Database(sqlx::Error::Database(db_error)) => db_error
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }

    /// Turns a unique-constraint violation into `Conflict`, anything else
    /// stays a database error.
    pub(crate) fn from_write(error: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                Self::Conflict(conflict())
            }
            _ => Self::Database(error),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(error) => Self::Domain(error),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict(message) => Self::Conflict(message),
            error if error.is_transient() => Self::Persistence(error.to_string()),
            error @ (RepositoryError::Database(_) | RepositoryError::Decode(_)) => {
                Self::Internal(error.to_string())
            }
        }
    }
}

/// Result of a committed stage event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedStage {
    pub task: SalesTask,
    pub entry: SalesTaskStatusLog,
}

#[async_trait]
pub trait SalesTaskRepository: Send + Sync {
    async fn create(&self, task: SalesTask) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &SalesTaskId) -> Result<Option<SalesTask>, RepositoryError>;

    async fn list(&self, include_archived: bool) -> Result<Vec<SalesTask>, RepositoryError>;

    async fn set_archived(
        &self,
        id: &SalesTaskId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<SalesTask, RepositoryError>;

    /// Validates and appends one stage event. Reading the log, folding it and
    /// appending the entry happen as one unit per task.
    async fn record_stage_event(
        &self,
        id: &SalesTaskId,
        event: StageEvent,
        now: DateTime<Utc>,
        audit: &AuditContext,
    ) -> Result<RecordedStage, RepositoryError>;

    async fn list_status_logs(
        &self,
        id: &SalesTaskId,
    ) -> Result<Vec<SalesTaskStatusLog>, RepositoryError>;
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    async fn create(&self, quotation: Quotation) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError>;

    async fn list(
        &self,
        status: Option<QuotationStatus>,
    ) -> Result<Vec<Quotation>, RepositoryError>;

    async fn update_status(
        &self,
        id: &QuotationId,
        raw_status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Quotation, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn list(&self) -> Result<Vec<User>, RepositoryError>;

    async fn set_active(
        &self,
        id: &UserId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError>;
}

#[async_trait]
pub trait LookupRepository: Send + Sync {
    async fn create(&self, entry: LookupEntry) -> Result<(), RepositoryError>;

    async fn list_by_kind(
        &self,
        kind: LookupKind,
        active_only: bool,
    ) -> Result<Vec<LookupEntry>, RepositoryError>;

    async fn set_active(
        &self,
        kind: LookupKind,
        id: &LookupId,
        active: bool,
    ) -> Result<LookupEntry, RepositoryError>;
}

#[async_trait]
pub trait CompanyProfileRepository: Send + Sync {
    async fn get(&self) -> Result<Option<CompanyProfile>, RepositoryError>;

    async fn save(&self, profile: CompanyProfile) -> Result<(), RepositoryError>;
}

/// Fixed-width RFC 3339 so text ordering in SQL matches time ordering.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
