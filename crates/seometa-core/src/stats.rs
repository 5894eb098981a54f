//! Coverage counters for the operator's "recalc" report.

use std::fmt;

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::keys::local;
use crate::storage::StorageBackend;
use crate::types::PostQuery;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageStats {
    pub total_published: u64,
    pub with_title: u64,
    pub with_desc: u64,
    pub noindex: u64,
}

impl fmt::Display for CoverageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total published posts/pages: {}", self.total_published)?;
        writeln!(f, "With SEO title override: {}", self.with_title)?;
        writeln!(f, "With meta description: {}", self.with_desc)?;
        write!(f, "Marked noindex: {}", self.noindex)
    }
}

pub async fn coverage(storage: &dyn StorageBackend, config: &MigrationConfig) -> Result<CoverageStats> {
    let status = config.post_status.as_str();
    let published = PostQuery {
        post_types: config.post_types.clone(),
        status: Some(status.to_string()),
        ..Default::default()
    };
    Ok(CoverageStats {
        total_published: storage.count_posts(&published).await?,
        with_title: storage.count_meta(local::META_TITLE, None, status).await?,
        with_desc: storage.count_meta(local::META_DESC, None, status).await?,
        noindex: storage.count_meta(local::NOINDEX, Some("1"), status).await?,
    })
}
