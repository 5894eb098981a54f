//! One-time foreground import of foreign SEO metadata.
//!
//! Walks every published post/page carrying foreign metadata in id order and
//! translates it, then copies the foreign plugin's site-wide options into the
//! settings blob. Safe to re-run: translation overwrites with the same values.
//! Progress is reported via the optional callback.

use serde_json::Value;

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::keys::{self, foreign};
use crate::sanitize;
use crate::settings::Settings;
use crate::storage::StorageBackend;
use crate::translator;
use crate::types::{LocalField, PostId, PostQuery};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Report what would change without writing anything.
    pub dry_run: bool,
    pub page_size: usize,
}

/// Progress callback data.
pub struct ImportProgress {
    pub post_id: PostId,
    pub scanned: u64,
    pub changes: Vec<LocalField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostChanges {
    pub post_id: PostId,
    pub changes: Vec<LocalField>,
}

/// Result of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub dry_run: bool,
    pub scanned: u64,
    pub changed: Vec<PostChanges>,
    /// Whether any site-wide option was copied into the settings blob.
    pub settings_updated: bool,
}

impl ImportReport {
    pub fn changed_posts(&self) -> usize {
        self.changed.len()
    }
}

pub async fn import_all<F>(
    storage: &dyn StorageBackend,
    config: &MigrationConfig,
    options: &ImportOptions,
    mut on_progress: Option<F>,
) -> Result<ImportReport>
where
    F: FnMut(ImportProgress) + Send,
{
    let mut query = PostQuery {
        post_types: config.post_types.clone(),
        status: Some(config.post_status.clone()),
        any_meta_keys: foreign::ALL.iter().map(|k| k.to_string()).collect(),
        limit: Some(options.page_size.max(1)),
        ..Default::default()
    };

    let mut scanned = 0u64;
    let mut changed = Vec::new();
    loop {
        let page = storage.query_posts(&query).await?;
        let Some(&last) = page.last() else {
            break;
        };
        for &post_id in &page {
            let changes = translator::translate(storage, post_id, !options.dry_run).await?;
            scanned += 1;
            if !changes.is_empty() {
                changed.push(PostChanges {
                    post_id,
                    changes: changes.clone(),
                });
            }
            if let Some(ref mut cb) = on_progress {
                cb(ImportProgress {
                    post_id,
                    scanned,
                    changes,
                });
            }
        }
        query.after = Some(last);
    }

    let mut settings_updated = false;
    if !options.dry_run {
        let mut settings = Settings::load(storage).await?;
        settings_updated = absorb_foreign_options(
            &mut settings,
            storage.get_option(foreign::OPTION_TITLES).await?.as_ref(),
            storage.get_option(foreign::OPTION_SOCIAL).await?.as_ref(),
            storage.get_option(foreign::OPTION_GENERAL).await?.as_ref(),
        );
        settings.flags.migration_yoast_done = true;
        settings.save(storage).await?;
    }

    tracing::info!(
        dry_run = options.dry_run,
        scanned,
        changed = changed.len(),
        settings_updated,
        option = keys::options::SETTINGS,
        "one-time import complete"
    );
    Ok(ImportReport {
        dry_run: options.dry_run,
        scanned,
        changed,
        settings_updated,
    })
}

fn non_empty<'a>(blob: Option<&'a Value>, key: &str) -> Option<&'a str> {
    blob?
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty() && *s != "0")
}

/// Copy the foreign plugin's site-wide options into `settings`.
/// Returns whether anything was copied.
pub fn absorb_foreign_options(
    settings: &mut Settings,
    titles: Option<&Value>,
    social: Option<&Value>,
    general: Option<&Value>,
) -> bool {
    let mut copied = false;

    if let Some(sep) = non_empty(titles, "separator") {
        settings.templates.separator = Some(sep.to_string());
        copied = true;
    }
    if let Some(title) = non_empty(titles, "title-home-wpseo") {
        settings.templates.home.title = Some(title.to_string());
        copied = true;
    }
    if let Some(meta) = non_empty(titles, "metadesc-home-wpseo") {
        settings.templates.home.meta = Some(meta.to_string());
        copied = true;
    }
    if let Some(image) = non_empty(social, "og_default_image") {
        settings.social.default_image = Some(sanitize::url_raw(image));
        copied = true;
    }
    if let Some(site) = non_empty(social, "twitter_site") {
        settings.social.twitter.site = Some(sanitize::text_field(site));
        copied = true;
    }
    if let Some(name) = non_empty(general, "company_name") {
        settings.site.name = Some(sanitize::text_field(name));
        copied = true;
    }
    if let Some(logo) = non_empty(general, "company_logo") {
        settings.site.logo = Some(sanitize::url_raw(logo));
        copied = true;
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absorb_foreign_options() {
        let mut settings = Settings::default();
        let copied = absorb_foreign_options(
            &mut settings,
            Some(&json!({"separator": "|", "title-home-wpseo": "Home", "metadesc-home-wpseo": ""})),
            Some(&json!({"og_default_image": "https://cdn.example.com/og.png", "twitter_site": " @site "})),
            Some(&json!({"company_name": "<b>Acme</b>"})),
        );
        assert!(copied);
        assert_eq!(settings.templates.separator.as_deref(), Some("|"));
        assert_eq!(settings.templates.home.title.as_deref(), Some("Home"));
        assert_eq!(settings.templates.home.meta, None);
        assert_eq!(
            settings.social.default_image.as_deref(),
            Some("https://cdn.example.com/og.png")
        );
        assert_eq!(settings.social.twitter.site.as_deref(), Some("@site"));
        assert_eq!(settings.site.name.as_deref(), Some("Acme"));
        assert_eq!(settings.site.logo, None);
    }

    #[test]
    fn test_absorb_nothing() {
        let mut settings = Settings::default();
        assert!(!absorb_foreign_options(&mut settings, None, Some(&json!("x")), None));
        assert_eq!(settings, Settings::default());
    }
}
