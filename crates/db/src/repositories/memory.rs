use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use freightdesk_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use freightdesk_core::domain::company::CompanyProfile;
use freightdesk_core::domain::lookup::{LookupEntry, LookupId, LookupKind};
use freightdesk_core::domain::quotation::{Quotation, QuotationId, QuotationStatus};
use freightdesk_core::domain::sales_task::{SalesTask, SalesTaskId, SalesTaskStatusLog};
use freightdesk_core::domain::user::{User, UserId};
use freightdesk_core::pipeline::{StageEvent, StageProgressEngine};

use super::{
    CompanyProfileRepository, LookupRepository, QuotationRepository, RecordedStage,
    RepositoryError, SalesTaskRepository, UserRepository,
};

pub struct InMemorySalesTaskRepository {
    tasks: RwLock<HashMap<String, SalesTask>>,
    engine: StageProgressEngine,
    audit_sink: Arc<dyn AuditSink>,
}

impl Default for InMemorySalesTaskRepository {
    fn default() -> Self {
        Self {
            tasks: RwLock::default(),
            engine: StageProgressEngine::new(),
            audit_sink: Arc::new(TracingAuditSink),
        }
    }
}

impl InMemorySalesTaskRepository {
    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }
}

#[async_trait::async_trait]
impl SalesTaskRepository for InMemorySalesTaskRepository {
    async fn create(&self, task: SalesTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "sales task `{}` already exists",
                task.id.0
            )));
        }
        tasks.insert(task.id.0.clone(), task);
        Ok(())
    }

    async fn find_by_id(&self, id: &SalesTaskId) -> Result<Option<SalesTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned().map(|mut task| {
            task.rebuild();
            task
        }))
    }

    async fn list(&self, include_archived: bool) -> Result<Vec<SalesTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut listed: Vec<SalesTask> = tasks
            .values()
            .filter(|task| include_archived || !task.archived)
            .cloned()
            .map(|mut task| {
                task.rebuild();
                task
            })
            .collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(listed)
    }

    async fn set_archived(
        &self,
        id: &SalesTaskId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<SalesTask, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::not_found("sales task", id.0.clone()))?;
        if task.archived != archived {
            task.archived = archived;
            task.updated_at = now;
        }
        Ok(task.clone())
    }

    async fn record_stage_event(
        &self,
        id: &SalesTaskId,
        event: StageEvent,
        now: DateTime<Utc>,
        audit: &AuditContext,
    ) -> Result<RecordedStage, RepositoryError> {
        // The write guard spans read, fold and append.
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::not_found("sales task", id.0.clone()))?;

        let transition =
            self.engine.record_with_audit(task, event, now, self.audit_sink.as_ref(), audit)?;
        let entry = transition.entry.clone();
        task.apply(transition)?;

        Ok(RecordedStage { task: task.clone(), entry })
    }

    async fn list_status_logs(
        &self,
        id: &SalesTaskId,
    ) -> Result<Vec<SalesTaskStatusLog>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let task =
            tasks.get(&id.0).ok_or_else(|| RepositoryError::not_found("sales task", id.0.clone()))?;

        let mut logs = task.status_logs.clone();
        logs.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then(left.sequence.cmp(&right.sequence))
        });
        Ok(logs)
    }
}

#[derive(Default)]
pub struct InMemoryQuotationRepository {
    quotations: RwLock<HashMap<String, Quotation>>,
}

#[async_trait::async_trait]
impl QuotationRepository for InMemoryQuotationRepository {
    async fn create(&self, quotation: Quotation) -> Result<(), RepositoryError> {
        let mut quotations = self.quotations.write().await;
        let taken = quotations.values().any(|existing| existing.reference == quotation.reference);
        if taken || quotations.contains_key(&quotation.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "quotation reference `{}` is already in use",
                quotation.reference
            )));
        }
        quotations.insert(quotation.id.0.clone(), quotation);
        Ok(())
    }

    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let quotations = self.quotations.read().await;
        Ok(quotations.get(&id.0).cloned())
    }

    async fn list(
        &self,
        status: Option<QuotationStatus>,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let quotations = self.quotations.read().await;
        let mut listed: Vec<Quotation> = quotations
            .values()
            .filter(|quotation| status.map_or(true, |status| quotation.status == status))
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.reference.cmp(&right.reference))
        });
        Ok(listed)
    }

    async fn update_status(
        &self,
        id: &QuotationId,
        raw_status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Quotation, RepositoryError> {
        let mut quotations = self.quotations.write().await;
        let quotation = quotations
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::not_found("quotation", id.0.clone()))?;
        quotation.set_status(raw_status, now);
        Ok(quotation.clone())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id.0) {
            return Err(RepositoryError::Conflict(format!("user `{}` already exists", user.id.0)));
        }
        if users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict(format!(
                "a user with email `{}` already exists",
                user.email
            )));
        }
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut listed: Vec<User> = users.values().cloned().collect();
        listed.sort_by(|left, right| {
            left.name.cmp(&right.name).then_with(|| left.email.cmp(&right.email))
        });
        Ok(listed)
    }

    async fn set_active(
        &self,
        id: &UserId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let user =
            users.get_mut(&id.0).ok_or_else(|| RepositoryError::not_found("user", id.0.clone()))?;
        user.set_active(active, now);
        Ok(user.clone())
    }
}

#[derive(Default)]
pub struct InMemoryLookupRepository {
    entries: RwLock<HashMap<String, LookupEntry>>,
}

#[async_trait::async_trait]
impl LookupRepository for InMemoryLookupRepository {
    async fn create(&self, entry: LookupEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        let taken = entries
            .values()
            .any(|existing| existing.kind == entry.kind && existing.code == entry.code);
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "{} `{}` already exists",
                entry.kind.as_str(),
                entry.code
            )));
        }
        entries.insert(entry.id.0.clone(), entry);
        Ok(())
    }

    async fn list_by_kind(
        &self,
        kind: LookupKind,
        active_only: bool,
    ) -> Result<Vec<LookupEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut listed: Vec<LookupEntry> = entries
            .values()
            .filter(|entry| entry.kind == kind && (entry.active || !active_only))
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.code.cmp(&right.code));
        Ok(listed)
    }

    async fn set_active(
        &self,
        kind: LookupKind,
        id: &LookupId,
        active: bool,
    ) -> Result<LookupEntry, RepositoryError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id.0)
            .filter(|entry| entry.kind == kind)
            .ok_or_else(|| RepositoryError::not_found("lookup entry", id.0.clone()))?;
        entry.active = active;
        Ok(entry.clone())
    }
}

#[derive(Default)]
pub struct InMemoryCompanyProfileRepository {
    profile: RwLock<Option<CompanyProfile>>,
}

#[async_trait::async_trait]
impl CompanyProfileRepository for InMemoryCompanyProfileRepository {
    async fn get(&self) -> Result<Option<CompanyProfile>, RepositoryError> {
        Ok(self.profile.read().await.clone())
    }

    async fn save(&self, profile: CompanyProfile) -> Result<(), RepositoryError> {
        *self.profile.write().await = Some(profile);
        Ok(())
    }
}
