//! Durable record of background migration progress.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::StorageBackend;

/// Singleton migration status, persisted as one option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationState {
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub batch_size: u32,
    /// Candidate count taken once at start. Advisory only.
    pub estimated_total: u64,
    pub processed_count: u64,
    pub modified_count: u64,
    /// Identifies the `start` that created this record.
    pub run_id: Option<Uuid>,
}

impl MigrationState {
    /// True when a record exists from an earlier run (used for the summary line).
    pub fn has_history(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Operator-facing summary of the state.
impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.in_progress {
            write!(
                f,
                "In progress… Processed {} of ~{}; Modified {}. Batch size: {}.",
                self.processed_count, self.estimated_total, self.modified_count, self.batch_size
            )
        } else if self.has_history() {
            write!(
                f,
                "Last run summary: Processed {} of ~{}; Modified {}.",
                self.processed_count, self.estimated_total, self.modified_count
            )
        } else {
            write!(f, "Not running.")
        }
    }
}

/// A state snapshot plus the storage version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Reads and conditionally writes the [`MigrationState`] option.
#[derive(Clone)]
pub struct ProgressStore {
    storage: Arc<dyn StorageBackend>,
    option: String,
}

impl ProgressStore {
    pub fn new(storage: Arc<dyn StorageBackend>, option: &str) -> Self {
        ProgressStore {
            storage,
            option: option.to_string(),
        }
    }

    pub fn option_name(&self) -> &str {
        &self.option
    }

    /// Current snapshot; a default (idle) state at version 0 when absent.
    pub async fn read(&self) -> Result<Versioned<MigrationState>> {
        match self.storage.get_option_versioned(&self.option).await? {
            Some(stored) => Ok(Versioned {
                value: serde_json::from_value(stored.value)?,
                version: stored.version,
            }),
            None => Ok(Versioned {
                value: MigrationState::default(),
                version: 0,
            }),
        }
    }

    /// Write `state` if nobody else wrote since `expected_version`.
    /// Returns the new version, or `None` when the write lost the race.
    pub async fn write(
        &self,
        state: &MigrationState,
        expected_version: u64,
    ) -> Result<Option<u64>> {
        let value = serde_json::to_value(state)?;
        self.storage
            .compare_and_set_option(&self.option, expected_version, &value)
            .await
    }

    /// A fresh running state with zeroed counters.
    pub fn reset_for_start(batch_size: u32, estimated_total: u64) -> MigrationState {
        MigrationState {
            in_progress: true,
            started_at: Some(Utc::now()),
            batch_size,
            estimated_total,
            processed_count: 0,
            modified_count: 0,
            run_id: Some(Uuid::new_v4()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteStorage;

    async fn store() -> ProgressStore {
        let storage = SqliteStorage::new(":memory:").await.unwrap();
        ProgressStore::new(Arc::new(storage), "state")
    }

    #[tokio::test]
    async fn test_read_absent_is_idle() {
        let store = store().await;
        let current = store.read().await.unwrap();
        assert_eq!(current.version, 0);
        assert!(!current.value.in_progress);
        assert_eq!(current.value.to_string(), "Not running.");
    }

    #[tokio::test]
    async fn test_write_is_conditional() {
        let store = store().await;
        let fresh = ProgressStore::reset_for_start(100, 40);
        assert_eq!(store.write(&fresh, 0).await.unwrap(), Some(1));

        let mut stale = fresh.clone();
        stale.processed_count = 99;
        assert_eq!(store.write(&stale, 0).await.unwrap(), None);

        let current = store.read().await.unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.value, fresh);
    }

    #[test]
    fn test_status_lines() {
        let mut state = ProgressStore::reset_for_start(200, 1000);
        state.processed_count = 400;
        state.modified_count = 120;
        assert_eq!(
            state.to_string(),
            "In progress… Processed 400 of ~1000; Modified 120. Batch size: 200."
        );
        state.in_progress = false;
        assert_eq!(state.to_string(), "Last run summary: Processed 400 of ~1000; Modified 120.");
    }
}
