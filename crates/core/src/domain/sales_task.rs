use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::Actor;
use crate::domain::{optional, required};
use crate::errors::DomainError;
use crate::pipeline::{overall_status, project_progress, StageTransition};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SalesTaskId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusLogId(pub String);

/// Sales pipeline stages. Declaration order is the canonical order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesTaskStage {
    Meet,
    ContactByPhone,
    MeetingDate,
    GiveInfo,
    Contract,
}

impl SalesTaskStage {
    pub const ORDER: [Self; 5] =
        [Self::Meet, Self::ContactByPhone, Self::MeetingDate, Self::GiveInfo, Self::Contract];

    pub fn first() -> Self {
        Self::ORDER[0]
    }

    pub fn position(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meet => "MEET",
            Self::ContactByPhone => "CONTACT_BY_PHONE",
            Self::MeetingDate => "MEETING_DATE",
            Self::GiveInfo => "GIVE_INFO",
            Self::Contract => "CONTRACT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match key.as_str() {
            "MEET" => Some(Self::Meet),
            "CONTACT_BY_PHONE" => Some(Self::ContactByPhone),
            "MEETING_DATE" => Some(Self::MeetingDate),
            "GIVE_INFO" => Some(Self::GiveInfo),
            "CONTRACT" => Some(Self::Contract),
            _ => None,
        }
    }
}

impl FromStr for SalesTaskStage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| DomainError::InvalidStage(value.trim().to_owned()))
    }
}

impl fmt::Display for SalesTaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTaskStageProgress {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by_name: Option<String>,
    pub completed_by_email: Option<String>,
}

impl SalesTaskStageProgress {
    pub fn pending() -> Self {
        Self::default()
    }

    /// Progress implied by a single log entry.
    pub fn from_entry(entry: &SalesTaskStatusLog) -> Self {
        if !entry.completed {
            return Self::pending();
        }

        Self {
            completed: true,
            completed_at: Some(entry.created_at),
            completed_by_name: entry.actor_name.clone(),
            completed_by_email: entry.actor_email.clone(),
        }
    }
}

/// Completion state for every stage. Total by construction: one slot per
/// stage, indexed by canonical position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<SalesTaskStage, SalesTaskStageProgress>",
    into = "BTreeMap<SalesTaskStage, SalesTaskStageProgress>"
)]
pub struct SalesTaskProgress {
    stages: [SalesTaskStageProgress; 5],
}

impl SalesTaskProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: SalesTaskStage) -> &SalesTaskStageProgress {
        &self.stages[stage.position()]
    }

    pub fn set(&mut self, stage: SalesTaskStage, progress: SalesTaskStageProgress) {
        self.stages[stage.position()] = progress;
    }

    pub fn is_completed(&self, stage: SalesTaskStage) -> bool {
        self.get(stage).completed
    }

    pub fn iter(&self) -> impl Iterator<Item = (SalesTaskStage, &SalesTaskStageProgress)> + '_ {
        SalesTaskStage::ORDER.into_iter().map(move |stage| (stage, self.get(stage)))
    }

    pub fn completed_count(&self) -> usize {
        self.stages.iter().filter(|progress| progress.completed).count()
    }
}

impl From<BTreeMap<SalesTaskStage, SalesTaskStageProgress>> for SalesTaskProgress {
    fn from(mut value: BTreeMap<SalesTaskStage, SalesTaskStageProgress>) -> Self {
        let mut progress = Self::new();
        for stage in SalesTaskStage::ORDER {
            if let Some(entry) = value.remove(&stage) {
                progress.set(stage, entry);
            }
        }
        progress
    }
}

impl From<SalesTaskProgress> for BTreeMap<SalesTaskStage, SalesTaskStageProgress> {
    fn from(value: SalesTaskProgress) -> Self {
        SalesTaskStage::ORDER.into_iter().zip(value.stages).collect()
    }
}

/// One immutable entry in a task's stage log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTaskStatusLog {
    pub id: StatusLogId,
    pub task_id: SalesTaskId,
    /// Insertion order within the task, starting at 1.
    pub sequence: u64,
    pub status: SalesTaskStage,
    pub completed: bool,
    pub comment: Option<String>,
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTask {
    pub id: SalesTaskId,
    pub client_name: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub commodity: Option<String>,
    pub notes: Option<String>,
    pub status: SalesTaskStage,
    pub progress: SalesTaskProgress,
    pub status_logs: Vec<SalesTaskStatusLog>,
    pub archived: bool,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesTask {
    pub client_name: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub commodity: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SalesTask {
    pub fn open(
        id: SalesTaskId,
        input: NewSalesTask,
        created_by: Actor,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let created_by = created_by.normalized();
        if !created_by.is_attributable() {
            return Err(DomainError::validation("created_by", "a sales task needs an owner"));
        }

        Ok(Self {
            id,
            client_name: required("client_name", &input.client_name)?,
            origin: optional(input.origin),
            destination: optional(input.destination),
            commodity: optional(input.commodity),
            notes: optional(input.notes),
            status: SalesTaskStage::first(),
            progress: SalesTaskProgress::new(),
            status_logs: Vec::new(),
            archived: false,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn next_sequence(&self) -> u64 {
        self.status_logs.iter().map(|entry| entry.sequence).max().unwrap_or(0) + 1
    }

    /// Commits a transition produced by the stage engine. Callers persist the
    /// entry first; this only moves the in-memory aggregate forward.
    pub fn apply(&mut self, transition: StageTransition) -> Result<(), DomainError> {
        if transition.entry.task_id != self.id {
            return Err(DomainError::InvariantViolation(format!(
                "log entry for task `{}` applied to task `{}`",
                transition.entry.task_id.0, self.id.0
            )));
        }

        self.updated_at = self.updated_at.max(transition.entry.created_at);
        self.status_logs.push(transition.entry);
        self.progress = transition.progress;
        self.status = transition.status;
        Ok(())
    }

    /// Recomputes progress and status from the log alone.
    pub fn rebuild(&mut self) {
        self.status_logs.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then(left.sequence.cmp(&right.sequence))
        });
        self.progress = project_progress(&self.status_logs);
        self.status = overall_status(&self.progress);
    }
}
