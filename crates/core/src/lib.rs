pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pipeline;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::actor::Actor;
pub use domain::company::{CompanyProfile, CompanyProfileUpdate};
pub use domain::lookup::{LookupEntry, LookupId, LookupKind, NewLookupEntry};
pub use domain::quotation::{
    NewQuotation, Quotation, QuotationClassification, QuotationId, QuotationStatus,
};
pub use domain::sales_task::{
    NewSalesTask, SalesTask, SalesTaskId, SalesTaskProgress, SalesTaskStage,
    SalesTaskStageProgress, SalesTaskStatusLog, StatusLogId,
};
pub use domain::user::{NewUser, User, UserId, UserRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pipeline::{StageEvent, StageProgressEngine, StageTransition};
