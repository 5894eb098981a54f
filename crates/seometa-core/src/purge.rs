//! Uninstall-time removal of everything this system stored.

use crate::error::Result;
use crate::keys;
use crate::storage::StorageBackend;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub options_deleted: usize,
    pub meta_rows_deleted: u64,
}

/// Delete the settings blob, migration state, pending schedule, and every
/// owned per-post key, completion markers included.
pub async fn purge(storage: &dyn StorageBackend) -> Result<PurgeReport> {
    let mut report = PurgeReport::default();
    for name in [
        keys::options::SETTINGS,
        keys::options::MIGRATION_STATE,
        keys::options::CRON,
    ] {
        if storage.delete_option(name).await? {
            report.options_deleted += 1;
        }
    }
    for key in keys::local::OWNED {
        report.meta_rows_deleted += storage.delete_meta_key(key).await?;
    }
    tracing::info!(
        options_deleted = report.options_deleted,
        meta_rows_deleted = report.meta_rows_deleted,
        "purged plugin data"
    );
    Ok(report)
}
