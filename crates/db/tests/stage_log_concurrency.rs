use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use freightdesk_core::audit::AuditContext;
use freightdesk_core::domain::actor::Actor;
use freightdesk_core::domain::sales_task::{NewSalesTask, SalesTask, SalesTaskId, SalesTaskStage};
use freightdesk_core::pipeline::StageEvent;
use freightdesk_db::repositories::{
    InMemorySalesTaskRepository, SalesTaskRepository, SqlSalesTaskRepository,
};
use freightdesk_db::{connect_with_settings, migrations};

const WRITERS: usize = 8;

fn open_task(id: &SalesTaskId) -> SalesTask {
    SalesTask::open(
        id.clone(),
        NewSalesTask { client_name: "Baltic Timber".to_owned(), ..NewSalesTask::default() },
        Actor::named("Alice"),
        Utc::now() - Duration::hours(1),
    )
    .expect("open task")
}

async fn hammer(repo: Arc<dyn SalesTaskRepository>, id: SalesTaskId) {
    let mut handles = Vec::with_capacity(WRITERS);
    for writer in 0..WRITERS {
        let repo = Arc::clone(&repo);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let stage = SalesTaskStage::ORDER[writer % SalesTaskStage::ORDER.len()];
            let audit = AuditContext::new(Some(id.0.clone()), format!("req-{writer}"), "load");
            repo.record_stage_event(
                &id,
                StageEvent::complete(stage.as_str(), Actor::named(format!("writer-{writer}"))),
                Utc::now(),
                &audit,
            )
            .await
        }));
    }

    for handle in handles {
        handle.await.expect("join writer").expect("record stage event");
    }

    let logs = repo.list_status_logs(&id).await.expect("logs");
    assert_eq!(logs.len(), WRITERS);

    let sequences: BTreeSet<u64> = logs.iter().map(|entry| entry.sequence).collect();
    let expected: BTreeSet<u64> = (1..=WRITERS as u64).collect();
    assert_eq!(sequences, expected, "every writer gets its own sequence number");

    let task = repo.find_by_id(&id).await.expect("find").expect("task exists");
    assert_eq!(task.status, SalesTaskStage::Contract);
    assert_eq!(task.progress.completed_count(), SalesTaskStage::ORDER.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_on_sqlite_get_distinct_sequences() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("freightdesk.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let id = SalesTaskId("ST-LOAD".to_owned());
    let repo: Arc<dyn SalesTaskRepository> = Arc::new(SqlSalesTaskRepository::new(pool));
    repo.create(open_task(&id)).await.expect("create");

    hammer(repo, id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_in_memory_get_distinct_sequences() {
    let id = SalesTaskId("ST-LOAD".to_owned());
    let repo: Arc<dyn SalesTaskRepository> = Arc::new(InMemorySalesTaskRepository::default());
    repo.create(open_task(&id)).await.expect("create");

    hammer(repo, id).await;
}

async fn toggle_contract(repo: Arc<dyn SalesTaskRepository>, id: SalesTaskId) {
    let start = Utc::now();
    let mut handles = Vec::with_capacity(WRITERS);
    for writer in 0..WRITERS {
        let repo = Arc::clone(&repo);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let actor = Actor::named(format!("writer-{writer}"));
            let event = if writer % 2 == 0 {
                StageEvent::complete("CONTRACT", actor)
            } else {
                StageEvent::reopen("CONTRACT", actor)
            };
            // Later writers read an earlier clock.
            let now = start - Duration::seconds(writer as i64);
            let audit = AuditContext::new(Some(id.0.clone()), format!("req-{writer}"), "load");
            repo.record_stage_event(&id, event, now, &audit).await
        }));
    }

    for handle in handles {
        handle.await.expect("join writer").expect("record stage event");
    }

    let mut logs = repo.list_status_logs(&id).await.expect("logs");
    assert_eq!(logs.len(), WRITERS);
    logs.sort_by_key(|entry| entry.sequence);
    assert!(
        logs.windows(2).all(|pair| pair[0].created_at <= pair[1].created_at),
        "timestamps never go backwards along the append order"
    );

    let last = logs.last().expect("at least one entry");
    let task = repo.find_by_id(&id).await.expect("find").expect("task exists");
    assert_eq!(task.progress.is_completed(SalesTaskStage::Contract), last.completed);
    let expected_status =
        if last.completed { SalesTaskStage::Contract } else { SalesTaskStage::first() };
    assert_eq!(task.status, expected_status);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_complete_and_reopen_on_sqlite_honour_append_order() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("toggle.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let id = SalesTaskId("ST-TOGGLE".to_owned());
    let repo: Arc<dyn SalesTaskRepository> = Arc::new(SqlSalesTaskRepository::new(pool));
    repo.create(open_task(&id)).await.expect("create");

    toggle_contract(repo, id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_complete_and_reopen_in_memory_honour_append_order() {
    let id = SalesTaskId("ST-TOGGLE".to_owned());
    let repo: Arc<dyn SalesTaskRepository> = Arc::new(InMemorySalesTaskRepository::default());
    repo.create(open_task(&id)).await.expect("create");

    toggle_contract(repo, id).await;
}
