//! Background migration engine.
//!
//! A resumable, idempotent batch processor. Each scheduled invocation
//! selects up to `batch_size` unmarked candidates in ascending id order,
//! translates them, then records completion markers and counters in a single
//! conditional write before re-arming (or finishing) the chain.
//!
//! State machine: `idle` (no record, or `in_progress = false`) and `running`.
//! `start` moves to running, `stop` and candidate exhaustion move back to
//! idle. A batch handler invoked while idle does nothing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::error::{Result, SeoMetaError};
use crate::keys;
use crate::marker::CompletionMarker;
use crate::progress::{MigrationState, ProgressStore, Versioned};
use crate::scheduler::{BatchScheduler, TaskRunner};
use crate::settings::Settings;
use crate::storage::StorageBackend;
use crate::translator;
use crate::types::{PostId, PostQuery, ProgressCommit};

/// What one batch did and the state it left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Candidates selected for this batch.
    pub selected: usize,
    pub processed: u64,
    pub modified: u64,
    pub state: MigrationState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Invoked while idle (e.g. a stray trigger after `stop`); nothing touched.
    Skipped,
    /// A full batch was processed and the next one is scheduled.
    Continued(BatchReport),
    /// Fewer candidates than the batch size remained: migration finished.
    Finished(BatchReport),
    /// `stop` landed while the batch ran. Its work is recorded, nothing re-armed.
    Stopped(BatchReport),
    /// A new `start` replaced the run while the batch ran. Its work is
    /// recorded against the new run, whose own chain continues.
    Superseded(BatchReport),
}

impl BatchOutcome {
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            BatchOutcome::Skipped => None,
            BatchOutcome::Continued(r)
            | BatchOutcome::Finished(r)
            | BatchOutcome::Stopped(r)
            | BatchOutcome::Superseded(r) => Some(r),
        }
    }
}

pub struct MigrationEngine {
    storage: Arc<dyn StorageBackend>,
    progress: ProgressStore,
    marker: CompletionMarker,
    scheduler: BatchScheduler,
    config: MigrationConfig,
}

impl MigrationEngine {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        runner: Arc<dyn TaskRunner>,
        config: MigrationConfig,
    ) -> Self {
        MigrationEngine {
            progress: ProgressStore::new(storage.clone(), keys::options::MIGRATION_STATE),
            marker: CompletionMarker::new(storage.clone(), keys::local::MIGRATED),
            scheduler: BatchScheduler::new(
                runner,
                keys::MIGRATE_BATCH_HOOK,
                config.reschedule_delay(),
            ),
            storage,
            config,
        }
    }

    /// Hook name the task runner fires for [`MigrationEngine::run_one_batch`].
    pub fn hook(&self) -> &str {
        self.scheduler.hook()
    }

    pub fn marker(&self) -> &CompletionMarker {
        &self.marker
    }

    /// Published posts of the configured types with foreign metadata and no
    /// completion marker.
    pub fn candidate_query(&self) -> PostQuery {
        self.marker.exclude_marked(PostQuery {
            post_types: self.config.post_types.clone(),
            status: Some(self.config.post_status.clone()),
            any_meta_keys: keys::foreign::ALL.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        })
    }

    pub async fn state(&self) -> Result<MigrationState> {
        Ok(self.progress.read().await?.value)
    }

    /// Apply `f` to the current state and write the result, retrying on
    /// concurrent writes.
    async fn swap_state<F>(&self, mut f: F) -> Result<MigrationState>
    where
        F: FnMut(&MigrationState) -> MigrationState + Send,
    {
        for _ in 0..self.config.commit_attempts {
            let current = self.progress.read().await?;
            let next = f(&current.value);
            if self.progress.write(&next, current.version).await?.is_some() {
                return Ok(next);
            }
            debug!("migration state changed concurrently, retrying");
        }
        Err(SeoMetaError::VersionConflict {
            name: self.progress.option_name().to_string(),
            attempts: self.config.commit_attempts,
        })
    }

    /// Begin (or restart) a background migration.
    ///
    /// The batch size is clamped into the configured range. The estimated
    /// total is a one-time count and is never recomputed mid-run. Starting
    /// while running resets the counters; markers already set are kept, so
    /// migrated posts are not visited again.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, requested_batch: u32) -> Result<MigrationState> {
        let batch_size = self.config.clamp_batch_size(requested_batch);
        if batch_size != requested_batch {
            debug!(requested_batch, batch_size, "batch size clamped");
        }

        let estimated_total = self.storage.count_posts(&self.candidate_query()).await?;
        let fresh = ProgressStore::reset_for_start(batch_size, estimated_total);
        let state = self
            .swap_state(|current| {
                if current.in_progress {
                    warn!(previous_run = ?current.run_id, "restarting a running migration, counters reset");
                }
                fresh.clone()
            })
            .await?;

        let at = self.scheduler.schedule_next().await?;
        info!(
            run_id = ?state.run_id,
            batch_size,
            estimated_total,
            first_batch_at = %at,
            "background migration started"
        );
        Ok(state)
    }

    /// Stop the chain. Counters are left as a last-run summary. A batch
    /// already executing finishes, but will not schedule another.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<MigrationState> {
        let state = self
            .swap_state(|current| MigrationState {
                in_progress: false,
                ..current.clone()
            })
            .await?;
        let cancelled = self.scheduler.cancel_pending().await?;
        info!(run_id = ?state.run_id, cancelled, "background migration stopped");
        Ok(state)
    }

    /// Process one batch. This is the callback the task runner invokes.
    ///
    /// Candidate selection errors propagate (the invocation is lost); a
    /// per-post translation error is logged and the post is still marked.
    #[tracing::instrument(skip(self))]
    pub async fn run_one_batch(&self) -> Result<BatchOutcome> {
        let snapshot = self.progress.read().await?;
        if !snapshot.value.in_progress {
            debug!("batch trigger while idle, ignoring");
            return Ok(BatchOutcome::Skipped);
        }
        let run_id = snapshot.value.run_id;
        let batch_size = snapshot.value.batch_size.max(1) as usize;

        let mut query = self.candidate_query();
        query.limit = Some(batch_size);
        let candidates = self.storage.query_posts(&query).await?;

        let mut processed = 0u64;
        let mut modified = 0u64;
        for &id in &candidates {
            match translator::translate(&*self.storage, id, true).await {
                Ok(changes) => {
                    if !changes.is_empty() {
                        modified += 1;
                    }
                    debug!(post_id = %id, ?changes, "post translated");
                }
                Err(e) => {
                    warn!(post_id = %id, error = %e, "translation failed, marking post visited anyway");
                }
            }
            processed += 1;
        }
        let exhausted = candidates.len() < batch_size;

        let (state, base) = self
            .commit_batch(snapshot, &candidates, processed, modified, exhausted)
            .await?;
        let report = BatchReport {
            selected: candidates.len(),
            processed,
            modified,
            state: state.clone(),
        };

        if base.run_id != run_id {
            info!(?run_id, new_run_id = ?base.run_id, processed, "batch finished after a restart");
            return Ok(BatchOutcome::Superseded(report));
        }
        if !base.in_progress {
            info!(?run_id, processed, "batch finished after stop, not rescheduling");
            return Ok(BatchOutcome::Stopped(report));
        }
        if exhausted {
            Settings::mark_migration_done(&*self.storage).await?;
            info!(
                ?run_id,
                processed_total = state.processed_count,
                modified_total = state.modified_count,
                "background migration finished"
            );
            return Ok(BatchOutcome::Finished(report));
        }

        let at = self.scheduler.schedule_next().await?;
        info!(
            ?run_id,
            processed,
            modified,
            processed_total = state.processed_count,
            estimated_total = state.estimated_total,
            next_batch_at = %at,
            "batch complete"
        );
        Ok(BatchOutcome::Continued(report))
    }

    /// Write markers and counters atomically. When the record moved on since
    /// `snapshot`, the increments are rebased onto the latest record.
    ///
    /// Returns the written state and the record it was based on.
    async fn commit_batch(
        &self,
        snapshot: Versioned<MigrationState>,
        marked: &[PostId],
        processed: u64,
        modified: u64,
        exhausted: bool,
    ) -> Result<(MigrationState, MigrationState)> {
        let mut base = snapshot;
        let run_id = base.value.run_id;

        for _ in 0..self.config.commit_attempts {
            let mut next = base.value.clone();
            next.processed_count += processed;
            next.modified_count += modified;
            // Only the run that selected these candidates may declare itself done.
            if exhausted && next.in_progress && next.run_id == run_id {
                next.in_progress = false;
            }

            let commit = ProgressCommit {
                state_option: self.progress.option_name().to_string(),
                expected_version: base.version,
                state: serde_json::to_value(&next)?,
                marker_key: self.marker.key().to_string(),
                marked: marked.to_vec(),
            };
            if self.storage.commit_progress(&commit).await?.is_some() {
                return Ok((next, base.value));
            }

            debug!("migration state changed during batch, rebasing counters");
            base = self.progress.read().await?;
        }

        Err(SeoMetaError::VersionConflict {
            name: self.progress.option_name().to_string(),
            attempts: self.config.commit_attempts,
        })
    }
}
