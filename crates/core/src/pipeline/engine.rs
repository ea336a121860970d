use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::Actor;
use crate::domain::optional;
use crate::domain::sales_task::{
    SalesTask, SalesTaskProgress, SalesTaskStage, SalesTaskStatusLog, StatusLogId,
};
use crate::errors::DomainError;
use crate::pipeline::projection::{overall_status, project_progress};

/// A request to mark a stage completed or not completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: String,
    pub completed: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub actor: Actor,
}

impl StageEvent {
    pub fn complete(stage: impl Into<String>, actor: Actor) -> Self {
        Self { stage: stage.into(), completed: true, comment: None, actor }
    }

    pub fn reopen(stage: impl Into<String>, actor: Actor) -> Self {
        Self { stage: stage.into(), completed: false, comment: None, actor }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub entry: SalesTaskStatusLog,
    pub progress: SalesTaskProgress,
    pub previous_status: SalesTaskStage,
    pub status: SalesTaskStage,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StageProgressEngine;

impl StageProgressEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validates `event` against `task` and computes the resulting entry,
    /// progress and overall status. The task itself is left untouched.
    ///
    /// The entry is stamped with `now`, or with the latest logged timestamp
    /// when the clock reads earlier, so appends never sort before history.
    pub fn record(
        &self,
        task: &SalesTask,
        event: StageEvent,
        now: DateTime<Utc>,
    ) -> Result<StageTransition, DomainError> {
        let stage = event.stage.parse::<SalesTaskStage>()?;
        let actor = event.actor.normalized();
        if event.completed && !actor.is_attributable() {
            return Err(DomainError::MissingAttribution { stage });
        }

        let entry = SalesTaskStatusLog {
            id: StatusLogId(Uuid::new_v4().to_string()),
            task_id: task.id.clone(),
            sequence: task.next_sequence(),
            status: stage,
            completed: event.completed,
            comment: optional(event.comment),
            actor_name: actor.name,
            actor_email: actor.email,
            created_at: appended_at(task, now),
        };

        let mut logs = Vec::with_capacity(task.status_logs.len() + 1);
        logs.extend_from_slice(&task.status_logs);
        logs.push(entry.clone());
        let progress = project_progress(&logs);
        let status = overall_status(&progress);

        Ok(StageTransition { entry, progress, previous_status: task.status, status })
    }

    pub fn record_with_audit<S>(
        &self,
        task: &SalesTask,
        event: StageEvent,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<StageTransition, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let requested_stage = event.stage.clone();
        let completed = event.completed;
        let result = self.record(task, event, now);
        match &result {
            Ok(transition) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "sales_task.stage_recorded",
                        AuditCategory::SalesTask,
                        AuditOutcome::Success,
                    )
                    .with_metadata("stage", transition.entry.status.as_str())
                    .with_metadata("completed", completed.to_string())
                    .with_metadata("sequence", transition.entry.sequence.to_string())
                    .with_metadata("from", transition.previous_status.as_str())
                    .with_metadata("to", transition.status.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "sales_task.stage_rejected",
                        AuditCategory::SalesTask,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("stage", requested_stage)
                    .with_metadata("completed", completed.to_string())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn appended_at(task: &SalesTask, now: DateTime<Utc>) -> DateTime<Utc> {
    task.status_logs.iter().map(|entry| entry.created_at).fold(now, |latest, at| latest.max(at))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::{StageEvent, StageProgressEngine};
    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::actor::Actor;
    use crate::domain::sales_task::{NewSalesTask, SalesTask, SalesTaskId, SalesTaskStage};
    use crate::errors::DomainError;

    fn t1() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .expect("valid rfc3339")
            .with_timezone(&Utc)
    }

    fn task() -> SalesTask {
        SalesTask::open(
            SalesTaskId("ST-2026-0001".to_owned()),
            NewSalesTask {
                client_name: "Anatolia Textiles".to_owned(),
                origin: Some("Izmir".to_owned()),
                destination: Some("Hamburg".to_owned()),
                commodity: Some("Cotton yarn".to_owned()),
                notes: None,
            },
            Actor::new("Alice", "alice@forwarder.test"),
            t1() - Duration::days(1),
        )
        .expect("open task")
    }

    fn record(task: &mut SalesTask, event: StageEvent, at: DateTime<Utc>) {
        let transition = StageProgressEngine::new().record(task, event, at).expect("record");
        task.apply(transition).expect("apply");
    }

    #[test]
    fn status_follows_furthest_completed_stage() {
        let mut task = task();
        let t2 = t1() + Duration::minutes(30);

        record(&mut task, StageEvent::complete("MEET", Actor::named("Alice")), t1());
        record(&mut task, StageEvent::complete("CONTACT_BY_PHONE", Actor::named("Bob")), t2);

        assert_eq!(task.status, SalesTaskStage::ContactByPhone);
        assert_eq!(task.status_logs.len(), 2);
        assert_eq!(task.status_logs[0].created_at, t1());
        assert_eq!(task.status_logs[1].created_at, t2);
        assert_eq!(
            task.progress.get(SalesTaskStage::ContactByPhone).completed_by_name.as_deref(),
            Some("Bob")
        );
    }

    #[test]
    fn reopening_a_stage_clears_its_completion_and_reverts_status() {
        let mut task = task();

        record(&mut task, StageEvent::complete("MEET", Actor::named("Alice")), t1());
        record(
            &mut task,
            StageEvent::reopen("MEET", Actor::anonymous()).with_comment("client cancelled"),
            t1() + Duration::hours(1),
        );

        let meet = task.progress.get(SalesTaskStage::Meet);
        assert!(!meet.completed);
        assert_eq!(meet.completed_at, None);
        assert_eq!(meet.completed_by_name, None);
        assert_eq!(task.status_logs.len(), 2);
        assert_eq!(task.status_logs[1].comment.as_deref(), Some("client cancelled"));
        assert_eq!(task.status, SalesTaskStage::Meet);
    }

    #[test]
    fn reopening_one_stage_leaves_other_stages_alone() {
        let mut task = task();

        record(&mut task, StageEvent::complete("meet", Actor::named("Alice")), t1());
        record(
            &mut task,
            StageEvent::complete("meeting_date", Actor::named("Alice")),
            t1() + Duration::minutes(1),
        );
        record(
            &mut task,
            StageEvent::reopen("MEETING_DATE", Actor::named("Alice")),
            t1() + Duration::minutes(2),
        );

        assert!(task.progress.is_completed(SalesTaskStage::Meet));
        assert!(!task.progress.is_completed(SalesTaskStage::MeetingDate));
        assert_eq!(task.status, SalesTaskStage::Meet);
    }

    #[test]
    fn recompleting_refreshes_timestamp_and_attribution() {
        let mut task = task();
        let later = t1() + Duration::days(2);

        record(&mut task, StageEvent::complete("GIVE_INFO", Actor::named("Alice")), t1());
        record(
            &mut task,
            StageEvent::complete("GIVE_INFO", Actor::new("Bob", "bob@forwarder.test")),
            later,
        );

        let give_info = task.progress.get(SalesTaskStage::GiveInfo);
        assert!(give_info.completed);
        assert_eq!(give_info.completed_at, Some(later));
        assert_eq!(give_info.completed_by_name.as_deref(), Some("Bob"));
        assert_eq!(give_info.completed_by_email.as_deref(), Some("bob@forwarder.test"));
        assert_eq!(task.status_logs.len(), 2);
        assert_eq!(task.status_logs[1].sequence, 2);
    }

    #[test]
    fn completion_without_actor_is_rejected_and_appends_nothing() {
        let task = task();
        let before = task.clone();

        let error = StageProgressEngine::new()
            .record(&task, StageEvent::complete("MEET", Actor::anonymous()), t1())
            .expect_err("completion needs attribution");

        assert_eq!(error, DomainError::MissingAttribution { stage: SalesTaskStage::Meet });
        assert_eq!(task, before);
        assert!(task.status_logs.is_empty());
    }

    #[test]
    fn blank_actor_fields_do_not_count_as_attribution() {
        let actor = Actor { name: Some("  ".to_owned()), email: Some(String::new()) };
        let error = StageProgressEngine::new()
            .record(&task(), StageEvent::complete("CONTRACT", actor), t1())
            .expect_err("blank actor");

        assert!(matches!(error, DomainError::MissingAttribution { .. }));
    }

    #[test]
    fn unknown_stage_is_a_validation_error() {
        let error = StageProgressEngine::new()
            .record(&task(), StageEvent::complete("NEGOTIATE", Actor::named("Alice")), t1())
            .expect_err("unknown stage");

        assert_eq!(error, DomainError::InvalidStage("NEGOTIATE".to_owned()));
    }

    #[test]
    fn reopen_may_omit_actor() {
        let transition = StageProgressEngine::new()
            .record(&task(), StageEvent::reopen("CONTRACT", Actor::anonymous()), t1())
            .expect("reopen without actor");

        assert!(!transition.entry.completed);
        assert_eq!(transition.entry.actor_name, None);
        assert_eq!(transition.status, SalesTaskStage::Meet);
    }

    #[test]
    fn clock_stepping_backwards_still_lets_the_new_event_win() {
        let mut task = task();

        record(&mut task, StageEvent::complete("CONTRACT", Actor::named("Alice")), t1());
        record(
            &mut task,
            StageEvent::reopen("CONTRACT", Actor::named("Alice")),
            t1() - Duration::minutes(5),
        );

        assert_eq!(task.status_logs[1].created_at, t1());
        assert!(!task.progress.is_completed(SalesTaskStage::Contract));
        assert_eq!(task.status, SalesTaskStage::Meet);

        let mut rebuilt = task.clone();
        rebuilt.rebuild();
        assert_eq!(rebuilt.progress, task.progress);
        assert_eq!(rebuilt.status, task.status);
    }

    #[test]
    fn audit_events_capture_accepted_and_rejected_records() {
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some("ST-2026-0001".to_owned()), "req-7", "Alice");
        let engine = StageProgressEngine::new();
        let task = task();

        engine
            .record_with_audit(
                &task,
                StageEvent::complete("MEET", Actor::named("Alice")),
                t1(),
                &sink,
                &audit,
            )
            .expect("recorded");
        let _ = engine.record_with_audit(
            &task,
            StageEvent::complete("MEET", Actor::anonymous()),
            t1(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "sales_task.stage_recorded");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("MEET"));
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
        assert!(events[1].metadata["error"].contains("MEET"));
    }
}
