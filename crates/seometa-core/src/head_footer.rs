//! Import of per-post custom head/footer code from the header/footer
//! injection plugin.

use std::fmt;

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::keys::{foreign, local};
use crate::storage::StorageBackend;
use crate::types::{PostId, PostQuery};

#[derive(Debug, Clone)]
pub struct HeadFooterOptions {
    pub dry_run: bool,
    /// Replace local code that is already set.
    pub overwrite: bool,
    /// Delete the foreign key once its code has been copied.
    pub cleanup: bool,
    pub page_size: usize,
    /// Maximum number of per-post lines kept in the report.
    pub report_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDecision {
    Migrate,
    SkipExists,
}

impl fmt::Display for CodeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeDecision::Migrate => write!(f, "migrate"),
            CodeDecision::SkipExists => write!(f, "skip (exists)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadFooterLine {
    pub post_id: PostId,
    pub title: String,
    pub head: Option<CodeDecision>,
    pub foot: Option<CodeDecision>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadFooterReport {
    pub dry_run: bool,
    pub overwrite: bool,
    pub head_candidates: u64,
    pub foot_candidates: u64,
    /// Head snippets migrated (or, on a dry run, that would be).
    pub head_migrated: u64,
    pub foot_migrated: u64,
    pub lines: Vec<HeadFooterLine>,
}

impl fmt::Display for HeadFooterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Found candidates: Head {}, Footer {}. {} (with{} overwrite): Head {}, Footer {}.",
            self.head_candidates,
            self.foot_candidates,
            if self.dry_run { "Will migrate" } else { "Migrated" },
            if self.overwrite { "" } else { "out" },
            self.head_migrated,
            self.foot_migrated,
        )?;
        for line in &self.lines {
            let mut parts = Vec::new();
            if let Some(head) = line.head {
                parts.push(format!("HEAD: {head}"));
            }
            if let Some(foot) = line.foot {
                parts.push(format!("FOOT: {foot}"));
            }
            writeln!(f, "Post {} ({}): {}", line.post_id, line.title, parts.join("; "))?;
        }
        Ok(())
    }
}

/// Copy one slot (head or footer). Returns the decision, or `None` when the
/// post has no foreign code for it.
async fn migrate_slot(
    storage: &dyn StorageBackend,
    id: PostId,
    source_key: &str,
    target_key: &str,
    options: &HeadFooterOptions,
) -> Result<Option<CodeDecision>> {
    let source = storage.get_post_meta(id, source_key).await?.unwrap_or_default();
    if source.is_empty() {
        return Ok(None);
    }
    let target = storage.get_post_meta(id, target_key).await?.unwrap_or_default();
    if !target.is_empty() && !options.overwrite {
        return Ok(Some(CodeDecision::SkipExists));
    }
    if !options.dry_run {
        // Code is copied verbatim; it is meant to be emitted as-is.
        storage.set_post_meta(id, target_key, &source).await?;
        if options.cleanup {
            storage.delete_post_meta(id, source_key).await?;
        }
    }
    Ok(Some(CodeDecision::Migrate))
}

pub async fn import_head_footer(
    storage: &dyn StorageBackend,
    config: &MigrationConfig,
    options: &HeadFooterOptions,
) -> Result<HeadFooterReport> {
    let mut query = PostQuery {
        post_types: config.post_types.clone(),
        status: Some(config.post_status.clone()),
        any_meta_keys: vec![foreign::HFG_HEADER.to_string(), foreign::HFG_FOOTER.to_string()],
        limit: Some(options.page_size.max(1)),
        ..Default::default()
    };
    let mut report = HeadFooterReport {
        dry_run: options.dry_run,
        overwrite: options.overwrite,
        ..Default::default()
    };

    loop {
        let page = storage.query_posts(&query).await?;
        let Some(&last) = page.last() else {
            break;
        };
        for &id in &page {
            let head = migrate_slot(storage, id, foreign::HFG_HEADER, local::HEAD_CODE, options).await?;
            let foot = migrate_slot(storage, id, foreign::HFG_FOOTER, local::FOOT_CODE, options).await?;

            if let Some(decision) = head {
                report.head_candidates += 1;
                if decision == CodeDecision::Migrate {
                    report.head_migrated += 1;
                }
            }
            if let Some(decision) = foot {
                report.foot_candidates += 1;
                if decision == CodeDecision::Migrate {
                    report.foot_migrated += 1;
                }
            }
            if (head.is_some() || foot.is_some()) && report.lines.len() < options.report_limit {
                let title = storage
                    .get_post(id)
                    .await?
                    .map(|p| p.title)
                    .unwrap_or_default();
                report.lines.push(HeadFooterLine {
                    post_id: id,
                    title,
                    head,
                    foot,
                });
            }
        }
        query.after = Some(last);
    }

    tracing::info!(
        dry_run = options.dry_run,
        head_migrated = report.head_migrated,
        foot_migrated = report.foot_migrated,
        "head/footer import complete"
    );
    Ok(report)
}
