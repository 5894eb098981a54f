//! Tests for the background migration engine and worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use seometa_core::keys::{foreign, local, options};
use seometa_core::progress::ProgressStore;
use seometa_core::storage::{StorageBackend, VersionedValue};
use seometa_core::types::ProgressCommit;
use seometa_core::{
    BatchOutcome, CronTable, MigrationConfig, MigrationEngine, MigrationState, MigrationWorker,
    Post, PostId, PostQuery, Result, SeoMetaError, Settings, SqliteStorage, TaskRunner,
    WorkerConfig,
};

/// Records schedule requests instead of firing anything.
#[derive(Default)]
struct RecordingRunner {
    scheduled: Mutex<Vec<String>>,
    cancelled: Mutex<usize>,
}

impl RecordingRunner {
    fn schedule_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn schedule_once(&self, hook: &str, _earliest: DateTime<Utc>) -> Result<()> {
        self.scheduled.lock().unwrap().push(hook.to_string());
        Ok(())
    }

    async fn cancel_all(&self, _hook: &str) -> Result<usize> {
        *self.cancelled.lock().unwrap() += 1;
        Ok(1)
    }
}

fn small_batches() -> MigrationConfig {
    MigrationConfig {
        batch_min: 1,
        reschedule_delay_secs: 0,
        ..Default::default()
    }
}

async fn seed_titles(storage: &dyn StorageBackend, ids: impl IntoIterator<Item = u64>) {
    for id in ids {
        storage.put_post(&Post::published(id, &format!("Post {id}"))).await.unwrap();
        storage
            .set_post_meta(PostId(id), foreign::TITLE, &format!("Title {id}"))
            .await
            .unwrap();
    }
}

async fn marked_count(storage: &dyn StorageBackend) -> u64 {
    storage.count_meta(local::MIGRATED, Some("1"), "publish").await.unwrap()
}

async fn setup(ids: std::ops::RangeInclusive<u64>) -> (Arc<SqliteStorage>, Arc<RecordingRunner>, MigrationEngine) {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    seed_titles(&*storage, ids).await;
    let runner = Arc::new(RecordingRunner::default());
    let engine = MigrationEngine::new(storage.clone(), runner.clone(), small_batches());
    (storage, runner, engine)
}

#[tokio::test]
async fn test_five_items_batch_of_two() {
    let (storage, runner, engine) = setup(1..=5).await;

    let state = engine.start(2).await.unwrap();
    assert!(state.in_progress);
    assert_eq!(state.estimated_total, 5);
    assert_eq!(runner.schedule_count(), 1);

    let first = engine.run_one_batch().await.unwrap();
    assert!(matches!(first, BatchOutcome::Continued(_)));
    assert_eq!(engine.state().await.unwrap().processed_count, 2);
    assert_eq!(marked_count(&*storage).await, 2);

    let second = engine.run_one_batch().await.unwrap();
    assert!(matches!(second, BatchOutcome::Continued(_)));
    assert_eq!(engine.state().await.unwrap().processed_count, 4);
    assert_eq!(marked_count(&*storage).await, 4);

    let third = engine.run_one_batch().await.unwrap();
    let BatchOutcome::Finished(report) = third else {
        panic!("expected Finished, got {third:?}");
    };
    assert_eq!(report.selected, 1);
    let state = engine.state().await.unwrap();
    assert_eq!(state.processed_count, 5);
    assert_eq!(state.modified_count, 5);
    assert!(!state.in_progress);
    assert!(Settings::load(&*storage).await.unwrap().flags.migration_yoast_done);

    // Start + two continued batches; the finishing batch did not re-arm.
    assert_eq!(runner.schedule_count(), 3);
}

#[tokio::test]
async fn test_marked_items_are_never_reselected() {
    let (storage, _runner, engine) = setup(1..=3).await;
    engine.start(2).await.unwrap();
    engine.run_one_batch().await.unwrap();
    engine.run_one_batch().await.unwrap();
    assert_eq!(marked_count(&*storage).await, 3);

    // Even a restart selects nothing already marked.
    let state = engine.start(2).await.unwrap();
    assert_eq!(state.estimated_total, 0);
    let outcome = engine.run_one_batch().await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(report.state.processed_count, 0);
    assert!(matches!(outcome, BatchOutcome::Finished(_)));
}

#[tokio::test]
async fn test_counters_are_monotonic() {
    let (storage, _runner, engine) = setup(1..=7).await;
    // Post 2 carries only an unset-looking value, so it is processed but not modified.
    storage.set_post_meta(PostId(2), foreign::TITLE, "0").await.unwrap();

    engine.start(3).await.unwrap();
    let mut last = MigrationState::default();
    loop {
        let outcome = engine.run_one_batch().await.unwrap();
        let state = engine.state().await.unwrap();
        assert!(state.processed_count >= last.processed_count);
        assert!(state.modified_count >= last.modified_count);
        assert!(state.processed_count >= state.modified_count);
        last = state;
        if matches!(outcome, BatchOutcome::Finished(_)) {
            break;
        }
    }
    assert_eq!(last.processed_count, 7);
    assert_eq!(last.modified_count, 6);
}

#[tokio::test]
async fn test_stray_trigger_after_stop_is_noop() {
    let (storage, runner, engine) = setup(1..=6).await;
    engine.start(2).await.unwrap();
    engine.run_one_batch().await.unwrap();

    let stopped = engine.stop().await.unwrap();
    assert!(!stopped.in_progress);
    assert_eq!(stopped.processed_count, 2);
    assert_eq!(*runner.cancelled.lock().unwrap(), 1);

    let scheduled = runner.schedule_count();
    let outcome = engine.run_one_batch().await.unwrap();
    assert_eq!(outcome, BatchOutcome::Skipped);
    assert_eq!(engine.state().await.unwrap(), stopped);
    assert_eq!(marked_count(&*storage).await, 2);
    assert_eq!(runner.schedule_count(), scheduled);
    assert_eq!(stopped.to_string(), "Last run summary: Processed 2 of ~6; Modified 2.");
}

#[tokio::test]
async fn test_idle_engine_skips() {
    let (_storage, runner, engine) = setup(1..=2).await;
    assert_eq!(engine.run_one_batch().await.unwrap(), BatchOutcome::Skipped);
    assert_eq!(runner.schedule_count(), 0);
    assert_eq!(engine.state().await.unwrap().to_string(), "Not running.");
}

#[tokio::test]
async fn test_batch_size_is_clamped() {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    let engine = MigrationEngine::new(
        storage,
        Arc::new(RecordingRunner::default()),
        MigrationConfig::default(),
    );
    assert_eq!(engine.start(5).await.unwrap().batch_size, 50);
    assert_eq!(engine.start(100_000).await.unwrap().batch_size, 2000);
    assert_eq!(engine.start(300).await.unwrap().batch_size, 300);
}

#[tokio::test]
async fn test_double_start_resets_counters_keeps_markers() {
    let (storage, _runner, engine) = setup(1..=5).await;
    let first = engine.start(2).await.unwrap();
    engine.run_one_batch().await.unwrap();

    let second = engine.start(2).await.unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert!(second.in_progress);
    assert_eq!(second.processed_count, 0);
    assert_eq!(second.estimated_total, 3);
    assert_eq!(marked_count(&*storage).await, 2);
}

#[tokio::test]
async fn test_candidate_filter_skips_other_types_and_drafts() {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    seed_titles(&*storage, [1]).await;
    storage.put_post(&Post::new(2, "page", "publish", "About")).await.unwrap();
    storage.set_post_meta(PostId(2), foreign::METADESC, "About us").await.unwrap();
    storage.put_post(&Post::new(3, "post", "draft", "Draft")).await.unwrap();
    storage.set_post_meta(PostId(3), foreign::TITLE, "Draft").await.unwrap();
    storage.put_post(&Post::new(4, "attachment", "publish", "Img")).await.unwrap();
    storage.set_post_meta(PostId(4), foreign::TITLE, "Img").await.unwrap();
    storage.put_post(&Post::published(5, "No foreign data")).await.unwrap();

    let engine = MigrationEngine::new(
        storage.clone(),
        Arc::new(RecordingRunner::default()),
        small_batches(),
    );
    let ids = storage.query_posts(&engine.candidate_query()).await.unwrap();
    assert_eq!(ids, vec![PostId(1), PostId(2)]);
}

#[derive(Clone, Copy)]
enum Interrupt {
    /// An operator `stop` lands while the batch runs.
    Stop,
    /// An operator `start` lands while the batch runs.
    Restart,
    /// Candidate selection fails.
    FailSelect,
    /// Reading this post's foreign metadata fails.
    FailPost(PostId),
}

/// Delegates to SQLite. When armed, the next candidate selection triggers
/// the configured interruption; `FailPost` applies on every read.
struct InterruptingStorage {
    inner: Arc<SqliteStorage>,
    armed: AtomicBool,
    action: Interrupt,
}

impl InterruptingStorage {
    async fn interrupt(&self) -> Result<()> {
        let progress = ProgressStore::new(self.inner.clone(), options::MIGRATION_STATE);
        let current = progress.read().await?;
        let next = match self.action {
            Interrupt::Restart => ProgressStore::reset_for_start(current.value.batch_size, 0),
            Interrupt::Stop => MigrationState {
                in_progress: false,
                ..current.value.clone()
            },
            Interrupt::FailSelect => {
                return Err(SeoMetaError::Storage("database is locked".to_string()))
            }
            Interrupt::FailPost(_) => return Ok(()),
        };
        progress.write(&next, current.version).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for InterruptingStorage {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }
    async fn get_option(&self, name: &str) -> Result<Option<Value>> {
        self.inner.get_option(name).await
    }
    async fn get_option_versioned(&self, name: &str) -> Result<Option<VersionedValue>> {
        self.inner.get_option_versioned(name).await
    }
    async fn set_option(&self, name: &str, value: &Value) -> Result<()> {
        self.inner.set_option(name, value).await
    }
    async fn compare_and_set_option(&self, name: &str, expected: u64, value: &Value) -> Result<Option<u64>> {
        self.inner.compare_and_set_option(name, expected, value).await
    }
    async fn delete_option(&self, name: &str) -> Result<bool> {
        self.inner.delete_option(name).await
    }
    async fn put_post(&self, post: &Post) -> Result<()> {
        self.inner.put_post(post).await
    }
    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        self.inner.get_post(id).await
    }
    async fn get_post_meta(&self, id: PostId, key: &str) -> Result<Option<String>> {
        if let Interrupt::FailPost(failing) = self.action {
            if failing == id && key.starts_with("_yoast_wpseo_") {
                return Err(SeoMetaError::Storage(format!("cannot read {key}")));
            }
        }
        self.inner.get_post_meta(id, key).await
    }
    async fn set_post_meta(&self, id: PostId, key: &str, value: &str) -> Result<()> {
        self.inner.set_post_meta(id, key, value).await
    }
    async fn delete_post_meta(&self, id: PostId, key: &str) -> Result<bool> {
        self.inner.delete_post_meta(id, key).await
    }
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<PostId>> {
        let ids = self.inner.query_posts(query).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.interrupt().await?;
        }
        Ok(ids)
    }
    async fn count_posts(&self, query: &PostQuery) -> Result<u64> {
        self.inner.count_posts(query).await
    }
    async fn count_meta(&self, key: &str, value: Option<&str>, status: &str) -> Result<u64> {
        self.inner.count_meta(key, value, status).await
    }
    async fn delete_meta_key(&self, key: &str) -> Result<u64> {
        self.inner.delete_meta_key(key).await
    }
    async fn commit_progress(&self, commit: &ProgressCommit) -> Result<Option<u64>> {
        self.inner.commit_progress(commit).await
    }
}

async fn interrupting_engine(action: Interrupt) -> (Arc<InterruptingStorage>, Arc<RecordingRunner>, MigrationEngine) {
    let inner = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    seed_titles(&*inner, 1..=6).await;
    let storage = Arc::new(InterruptingStorage {
        inner,
        armed: AtomicBool::new(false),
        action,
    });
    let runner = Arc::new(RecordingRunner::default());
    let engine = MigrationEngine::new(storage.clone(), runner.clone(), small_batches());
    (storage, runner, engine)
}

#[tokio::test]
async fn test_stop_during_batch_records_work_without_rearming() {
    let (storage, runner, engine) = interrupting_engine(Interrupt::Stop).await;
    engine.start(2).await.unwrap();
    storage.armed.store(true, Ordering::SeqCst);

    let outcome = engine.run_one_batch().await.unwrap();
    let BatchOutcome::Stopped(report) = outcome else {
        panic!("expected Stopped, got {outcome:?}");
    };
    assert_eq!(report.processed, 2);
    assert_eq!(report.state.processed_count, 2);
    assert!(!report.state.in_progress);
    assert_eq!(runner.schedule_count(), 1);
    assert_eq!(marked_count(&*storage.inner).await, 2);

    let state = engine.state().await.unwrap();
    assert!(!state.in_progress);
    assert_eq!(state.processed_count, 2);
}

#[tokio::test]
async fn test_restart_during_batch_is_superseded() {
    let (storage, runner, engine) = interrupting_engine(Interrupt::Restart).await;
    let first = engine.start(2).await.unwrap();
    storage.armed.store(true, Ordering::SeqCst);

    let outcome = engine.run_one_batch().await.unwrap();
    let BatchOutcome::Superseded(report) = outcome else {
        panic!("expected Superseded, got {outcome:?}");
    };
    assert_ne!(report.state.run_id, first.run_id);
    assert!(report.state.in_progress);
    assert_eq!(report.state.processed_count, 2);
    // The new run owns the chain; the superseded batch does not schedule.
    assert_eq!(runner.schedule_count(), 1);
}

#[tokio::test]
async fn test_select_failure_propagates_and_leaves_state() {
    let (storage, runner, engine) = interrupting_engine(Interrupt::FailSelect).await;
    engine.start(2).await.unwrap();
    let before = storage.get_option_versioned(options::MIGRATION_STATE).await.unwrap();
    storage.armed.store(true, Ordering::SeqCst);

    let err = engine.run_one_batch().await.unwrap_err();
    assert!(matches!(err, SeoMetaError::Storage(_)));

    let after = storage.get_option_versioned(options::MIGRATION_STATE).await.unwrap();
    assert_eq!(before, after);
    let state = engine.state().await.unwrap();
    assert!(state.in_progress);
    assert_eq!((state.processed_count, state.modified_count), (0, 0));
    assert_eq!(marked_count(&*storage.inner).await, 0);
    assert_eq!(runner.schedule_count(), 1);

    // The next invocation is an ordinary retry.
    let outcome = engine.run_one_batch().await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Continued(_)));
    assert_eq!(engine.state().await.unwrap().processed_count, 2);
}

#[tokio::test]
async fn test_failing_post_is_marked_and_counted_unmodified() {
    let (storage, _runner, engine) = interrupting_engine(Interrupt::FailPost(PostId(2))).await;
    engine.start(4).await.unwrap();

    let outcome = engine.run_one_batch().await.unwrap();
    let BatchOutcome::Continued(report) = outcome else {
        panic!("expected Continued, got {outcome:?}");
    };
    assert_eq!(report.processed, 4);
    assert_eq!(report.modified, 3);
    assert!(engine.marker().is_marked(PostId(2)).await.unwrap());
    assert_eq!(storage.inner.get_post_meta(PostId(2), local::META_TITLE).await.unwrap(), None);

    let outcome = engine.run_one_batch().await.unwrap();
    let BatchOutcome::Finished(report) = outcome else {
        panic!("expected Finished, got {outcome:?}");
    };
    assert_eq!(report.selected, 2);
    assert_eq!(report.state.processed_count, 6);
    assert_eq!(report.state.modified_count, 5);
}

#[tokio::test]
async fn test_finish_tolerates_array_flags_in_settings() {
    let (storage, _runner, engine) = setup(1..=1).await;
    storage
        .set_option(options::SETTINGS, &serde_json::json!({"flags": [], "sitemaps": {"on": true}}))
        .await
        .unwrap();
    engine.start(2).await.unwrap();

    let outcome = engine.run_one_batch().await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Finished(_)));
    let stored = storage.get_option(options::SETTINGS).await.unwrap().unwrap();
    assert_eq!(stored["flags"]["migration_yoast_done"], serde_json::json!(true));
    assert_eq!(stored["sitemaps"], serde_json::json!({"on": true}));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.db");
    let path = path.to_str().unwrap();

    {
        let storage = Arc::new(SqliteStorage::new(path).await.unwrap());
        seed_titles(&*storage, 1..=5).await;
        let cron = CronTable::new(storage.clone(), options::CRON);
        let engine = MigrationEngine::new(storage, Arc::new(cron), small_batches());
        engine.start(2).await.unwrap();
        engine.run_one_batch().await.unwrap();
    }

    let storage = Arc::new(SqliteStorage::new(path).await.unwrap());
    let cron = CronTable::new(storage.clone(), options::CRON);
    assert!(cron.next_due(seometa_core::keys::MIGRATE_BATCH_HOOK).await.unwrap().is_some());
    let engine = MigrationEngine::new(storage.clone(), Arc::new(cron), small_batches());
    let state = engine.state().await.unwrap();
    assert!(state.in_progress);
    assert_eq!(state.processed_count, 2);

    engine.run_one_batch().await.unwrap();
    assert_eq!(engine.state().await.unwrap().processed_count, 4);
    assert_eq!(marked_count(&*storage).await, 4);
}

fn fast_worker() -> WorkerConfig {
    WorkerConfig { poll_interval_ms: 10 }
}

#[tokio::test]
async fn test_worker_drives_migration_to_completion() {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    seed_titles(&*storage, 1..=9).await;
    let cron = CronTable::new(storage.clone(), options::CRON);
    let engine = Arc::new(MigrationEngine::new(
        storage.clone(),
        Arc::new(cron.clone()),
        small_batches(),
    ));
    engine.start(4).await.unwrap();

    let worker = MigrationWorker::new(engine.clone(), cron.clone(), fast_worker());
    let state = tokio::time::timeout(
        Duration::from_secs(10),
        worker.run_until_idle(CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(!state.in_progress);
    assert_eq!(state.processed_count, 9);
    assert_eq!(marked_count(&*storage).await, 9);
    assert!(cron.pending().await.unwrap().is_empty());
    assert!(Settings::load(&*storage).await.unwrap().flags.migration_yoast_done);
}

#[tokio::test]
async fn test_worker_reports_stalled_chain() {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    seed_titles(&*storage, 1..=3).await;
    let cron = CronTable::new(storage.clone(), options::CRON);
    let engine = Arc::new(MigrationEngine::new(
        storage.clone(),
        Arc::new(cron.clone()),
        small_batches(),
    ));
    engine.start(2).await.unwrap();
    // Simulate a lost invocation.
    cron.cancel_all(engine.hook()).await.unwrap();

    let worker = MigrationWorker::new(engine, cron, fast_worker());
    let state = worker.run_until_idle(CancellationToken::new()).await.unwrap();
    assert!(state.in_progress);
    assert_eq!(state.processed_count, 0);
}

#[tokio::test]
async fn test_spawned_worker_stops_on_cancel() {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    let cron = CronTable::new(storage.clone(), options::CRON);
    let engine = Arc::new(MigrationEngine::new(
        storage,
        Arc::new(cron.clone()),
        small_batches(),
    ));
    let shutdown = CancellationToken::new();
    let handle = MigrationWorker::new(engine, cron, fast_worker()).spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
