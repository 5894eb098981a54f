pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Post, PostId, PostQuery, ProgressCommit};

/// An option value together with the version the backend assigned to it.
///
/// Versions start at 1 on first write and increase by one on every write;
/// an absent option has version 0.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub value: Value,
    pub version: u64,
}

/// Trait for pluggable host-platform storage.
///
/// Covers the site-wide option store (a durable key/value map of JSON
/// values) and the per-post content store (posts plus string metadata).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Initialize storage (create tables, etc.).
    async fn initialize(&self) -> Result<()>;

    /// Read an option, `None` when it was never set.
    async fn get_option(&self, name: &str) -> Result<Option<Value>>;

    /// Read an option with its version.
    async fn get_option_versioned(&self, name: &str) -> Result<Option<VersionedValue>>;

    /// Unconditionally write an option.
    async fn set_option(&self, name: &str, value: &Value) -> Result<()>;

    /// Write an option only if its current version equals `expected_version`
    /// (0 meaning "absent"). Returns the new version, or `None` when the
    /// version did not match and nothing was written.
    async fn compare_and_set_option(
        &self,
        name: &str,
        expected_version: u64,
        value: &Value,
    ) -> Result<Option<u64>>;

    /// Delete an option.
    async fn delete_option(&self, name: &str) -> Result<bool>;

    /// Insert or replace a post row.
    async fn put_post(&self, post: &Post) -> Result<()>;

    /// Fetch a post row.
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Read a single-valued post meta entry.
    async fn get_post_meta(&self, id: PostId, key: &str) -> Result<Option<String>>;

    /// Set a post meta entry, replacing any previous value.
    async fn set_post_meta(&self, id: PostId, key: &str, value: &str) -> Result<()>;

    /// Delete a post meta entry.
    async fn delete_post_meta(&self, id: PostId, key: &str) -> Result<bool>;

    /// Select post ids matching the filter, ascending.
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<PostId>>;

    /// Count posts matching the filter (`after` and `limit` are ignored).
    async fn count_posts(&self, query: &PostQuery) -> Result<u64>;

    /// Count meta rows with `key` (and `value`, if given) on posts with `status`.
    async fn count_meta(&self, key: &str, value: Option<&str>, status: &str) -> Result<u64>;

    /// Delete every meta row with `key`, across all posts.
    async fn delete_meta_key(&self, key: &str) -> Result<u64>;

    /// Atomically set the completion markers and swap the state option.
    ///
    /// Returns the new state version, or `None` (with nothing written) when
    /// the state option's version no longer matches.
    async fn commit_progress(&self, commit: &ProgressCommit) -> Result<Option<u64>>;
}
