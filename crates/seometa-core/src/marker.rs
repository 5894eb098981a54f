//! Per-post "already visited by the background migration" flag.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::StorageBackend;
use crate::types::{PostId, PostQuery};

const TRUTHY: &str = "1";

#[derive(Clone)]
pub struct CompletionMarker {
    storage: Arc<dyn StorageBackend>,
    key: String,
}

impl CompletionMarker {
    pub fn new(storage: Arc<dyn StorageBackend>, key: &str) -> Self {
        CompletionMarker {
            storage,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Mark a single post. The engine does not call this: it sets markers in
    /// bulk through `StorageBackend::commit_progress` under [`Self::key`] and
    /// the same truthy value, so both paths agree on what "marked" means.
    pub async fn mark(&self, id: PostId) -> Result<()> {
        self.storage.set_post_meta(id, &self.key, TRUTHY).await
    }

    pub async fn is_marked(&self, id: PostId) -> Result<bool> {
        Ok(self.storage.get_post_meta(id, &self.key).await?.as_deref() == Some(TRUTHY))
    }

    /// Restrict `query` to unmarked posts. The exclusion runs inside the
    /// storage query, never as an in-memory filter.
    pub fn exclude_marked(&self, mut query: PostQuery) -> PostQuery {
        query.exclude_flagged = Some(self.key.clone());
        query
    }
}
