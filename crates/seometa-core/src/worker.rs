//! Fixed-interval background worker that fires due migration batches.
//!
//! Stands in for the host's traffic-driven task runner: every poll it claims
//! due hooks from the [`CronTable`] and runs them one at a time, so at most
//! one batch is in flight per worker.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::engine::{BatchOutcome, MigrationEngine};
use crate::error::Result;
use crate::progress::MigrationState;
use crate::scheduler::CronTable;

pub struct MigrationWorker {
    engine: Arc<MigrationEngine>,
    cron: CronTable,
    config: WorkerConfig,
}

impl MigrationWorker {
    pub fn new(engine: Arc<MigrationEngine>, cron: CronTable, config: WorkerConfig) -> Self {
        MigrationWorker {
            engine,
            cron,
            config,
        }
    }

    /// Run every hook due now. A failing batch is logged and its invocation
    /// dropped; nothing re-arms it.
    pub async fn tick(&self) -> Result<Vec<BatchOutcome>> {
        let mut outcomes = Vec::new();
        for hook in self.cron.take_due(Utc::now()).await? {
            if hook != self.engine.hook() {
                warn!(%hook, "no handler registered for due hook, dropping");
                continue;
            }
            match self.engine.run_one_batch().await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "migration batch failed"),
            }
        }
        Ok(outcomes)
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll = ?self.config.poll_interval(), "migration worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "worker tick failed");
                    }
                }
            }
        }
        info!("migration worker stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Poll until the migration is no longer running, nothing is pending for
    /// it (a stalled chain), or `shutdown` is cancelled.
    pub async fn run_until_idle(&self, shutdown: CancellationToken) -> Result<MigrationState> {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await?;
                    let state = self.engine.state().await?;
                    if !state.in_progress {
                        break;
                    }
                    if self.cron.next_due(self.engine.hook()).await?.is_none() {
                        warn!(
                            run_id = ?state.run_id,
                            "migration is in progress but no batch is scheduled; start it again to resume"
                        );
                        break;
                    }
                }
            }
        }
        self.engine.state().await
    }
}
