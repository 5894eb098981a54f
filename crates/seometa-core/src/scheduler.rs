//! One-shot scheduling of migration batches.
//!
//! The task runner only records intent ("fire this hook no sooner than T");
//! whoever drives it (the background worker, or the host's request loop)
//! decides when due hooks actually run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{Result, SeoMetaError};
use crate::storage::StorageBackend;

/// External scheduled-task runner.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Request one invocation of `hook` at or after `earliest`. Requests are
    /// not additive: a hook has at most one pending invocation.
    async fn schedule_once(&self, hook: &str, earliest: DateTime<Utc>) -> Result<()>;

    /// Drop every pending invocation of `hook`. Returns how many were dropped.
    async fn cancel_all(&self, hook: &str) -> Result<usize>;
}

/// Pending hooks and the earliest time each may fire.
pub type CronEntries = BTreeMap<String, DateTime<Utc>>;

const CRON_UPDATE_ATTEMPTS: u32 = 8;

/// Durable task runner keeping pending hooks in one option, updated with
/// compare-and-swap so a concurrent schedule and claim cannot lose entries.
#[derive(Clone)]
pub struct CronTable {
    storage: Arc<dyn StorageBackend>,
    option: String,
}

impl CronTable {
    pub fn new(storage: Arc<dyn StorageBackend>, option: &str) -> Self {
        CronTable {
            storage,
            option: option.to_string(),
        }
    }

    async fn load(&self) -> Result<(CronEntries, u64)> {
        match self.storage.get_option_versioned(&self.option).await? {
            Some(stored) => Ok((serde_json::from_value(stored.value)?, stored.version)),
            None => Ok((CronEntries::new(), 0)),
        }
    }

    async fn update<F, R>(&self, mut f: F) -> Result<R>
    where
        F: FnMut(&mut CronEntries) -> R + Send,
        R: Send,
    {
        for _ in 0..CRON_UPDATE_ATTEMPTS {
            let (mut entries, version) = self.load().await?;
            let result = f(&mut entries);
            let value = serde_json::to_value(&entries)?;
            if self
                .storage
                .compare_and_set_option(&self.option, version, &value)
                .await?
                .is_some()
            {
                return Ok(result);
            }
            tracing::debug!(option = %self.option, "cron table changed underneath, retrying");
        }
        Err(SeoMetaError::VersionConflict {
            name: self.option.clone(),
            attempts: CRON_UPDATE_ATTEMPTS,
        })
    }

    pub async fn pending(&self) -> Result<CronEntries> {
        Ok(self.load().await?.0)
    }

    pub async fn next_due(&self, hook: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.pending().await?.get(hook).copied())
    }

    /// Claim every hook due at `now`, removing it from the table.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let (entries, _) = self.load().await?;
        if !entries.values().any(|at| *at <= now) {
            return Ok(Vec::new());
        }
        self.update(|entries| {
            let due: Vec<String> = entries
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(hook, _)| hook.clone())
                .collect();
            for hook in &due {
                entries.remove(hook);
            }
            due
        })
        .await
    }
}

#[async_trait]
impl TaskRunner for CronTable {
    async fn schedule_once(&self, hook: &str, earliest: DateTime<Utc>) -> Result<()> {
        self.update(|entries| {
            let at = entries
                .get(hook)
                .map_or(earliest, |existing| (*existing).min(earliest));
            entries.insert(hook.to_string(), at);
        })
        .await
    }

    async fn cancel_all(&self, hook: &str) -> Result<usize> {
        self.update(|entries| usize::from(entries.remove(hook).is_some()))
            .await
    }
}

/// Arms and disarms the next migration batch.
#[derive(Clone)]
pub struct BatchScheduler {
    runner: Arc<dyn TaskRunner>,
    hook: String,
    delay: Duration,
}

impl BatchScheduler {
    pub fn new(runner: Arc<dyn TaskRunner>, hook: &str, delay: Duration) -> Self {
        BatchScheduler {
            runner,
            hook: hook.to_string(),
            delay,
        }
    }

    pub fn hook(&self) -> &str {
        &self.hook
    }

    /// Request the next batch after the configured fixed delay.
    pub async fn schedule_next(&self) -> Result<DateTime<Utc>> {
        self.schedule_next_in(self.delay).await
    }

    pub async fn schedule_next_in(&self, delay: Duration) -> Result<DateTime<Utc>> {
        let delta = TimeDelta::from_std(delay)
            .map_err(|e| SeoMetaError::InvalidArgument(format!("schedule delay: {e}")))?;
        let at = Utc::now() + delta;
        self.runner.schedule_once(&self.hook, at).await?;
        Ok(at)
    }

    pub async fn cancel_pending(&self) -> Result<usize> {
        self.runner.cancel_all(&self.hook).await
    }
}
