pub mod config;
pub mod engine;
pub mod error;
pub mod head_footer;
pub mod import;
pub mod keys;
pub mod marker;
pub mod progress;
pub mod purge;
pub mod sanitize;
pub mod scheduler;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod translator;
pub mod types;
pub mod worker;

// Re-export primary types for convenience
pub use config::{Config, ImportConfig, MigrationConfig, WorkerConfig};
pub use engine::{BatchOutcome, BatchReport, MigrationEngine};
pub use error::{Result, SeoMetaError};
pub use head_footer::{HeadFooterOptions, HeadFooterReport};
pub use import::{ImportOptions, ImportReport};
pub use marker::CompletionMarker;
pub use progress::{MigrationState, ProgressStore};
pub use scheduler::{BatchScheduler, CronTable, TaskRunner};
pub use settings::Settings;
pub use stats::CoverageStats;
pub use storage::sqlite::SqliteStorage;
pub use storage::{StorageBackend, VersionedValue};
pub use types::{LocalField, Post, PostId, PostQuery};
pub use worker::MigrationWorker;
