//! Maps one post's foreign SEO metadata onto this system's fields.
//!
//! Translation is planned first against the current local values (overlaid
//! with the plan's own pending writes), then optionally applied. A dry run
//! therefore never touches storage.

use crate::error::Result;
use crate::keys::{foreign, local};
use crate::sanitize;
use crate::storage::StorageBackend;
use crate::types::{LocalField, PostId};

/// The foreign plugin's per-post values; absent keys read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignMeta {
    pub title: String,
    pub desc: String,
    pub canonical: String,
    pub noindex: String,
    pub nofollow: String,
    pub robots_adv: String,
    pub og_title: String,
    pub og_desc: String,
    pub og_image: String,
    pub tw_title: String,
    pub tw_desc: String,
    pub tw_image: String,
    pub breadcrumb_title: String,
    pub primary_category: String,
}

impl ForeignMeta {
    pub async fn load(storage: &dyn StorageBackend, id: PostId) -> Result<Self> {
        let get = |key: &'static str| async move {
            storage
                .get_post_meta(id, key)
                .await
                .map(|v| v.unwrap_or_default())
        };
        Ok(ForeignMeta {
            title: get(foreign::TITLE).await?,
            desc: get(foreign::METADESC).await?,
            canonical: get(foreign::CANONICAL).await?,
            noindex: get(foreign::NOINDEX).await?,
            nofollow: get(foreign::NOFOLLOW).await?,
            robots_adv: get(foreign::ROBOTS_ADV).await?,
            og_title: get(foreign::OG_TITLE).await?,
            og_desc: get(foreign::OG_DESC).await?,
            og_image: get(foreign::OG_IMAGE).await?,
            tw_title: get(foreign::TW_TITLE).await?,
            tw_desc: get(foreign::TW_DESC).await?,
            tw_image: get(foreign::TW_IMAGE).await?,
            breadcrumb_title: get(foreign::BREADCRUMB_TITLE).await?,
            primary_category: get(foreign::PRIMARY_CATEGORY).await?,
        })
    }
}

/// `""` and `"0"` count as unset, matching how the foreign plugin stores
/// cleared fields.
fn is_set(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    Set(String),
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub field: LocalField,
    pub key: &'static str,
    pub action: WriteAction,
}

/// The writes one translation would perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub post_id: PostId,
    pub writes: Vec<PlannedWrite>,
}

impl Translation {
    /// Changed field identifiers, in write order.
    pub fn changes(&self) -> Vec<LocalField> {
        self.writes.iter().map(|w| w.field).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn push(&mut self, field: LocalField, key: &'static str, action: WriteAction) {
        self.writes.push(PlannedWrite { field, key, action });
    }

    fn set(&mut self, field: LocalField, key: &'static str, value: String) {
        self.push(field, key, WriteAction::Set(value));
    }

    /// The value `key` will hold once the plan so far is applied.
    async fn effective(&self, storage: &dyn StorageBackend, key: &str) -> Result<String> {
        if let Some(write) = self.writes.iter().rev().find(|w| w.key == key) {
            return Ok(match &write.action {
                WriteAction::Set(v) => v.clone(),
                WriteAction::Delete => String::new(),
            });
        }
        Ok(storage.get_post_meta(self.post_id, key).await?.unwrap_or_default())
    }
}

/// Work out what translating `id` would write, without writing anything.
pub async fn plan(storage: &dyn StorageBackend, id: PostId) -> Result<Translation> {
    let src = ForeignMeta::load(storage, id).await?;
    let mut t = Translation {
        post_id: id,
        writes: Vec::new(),
    };

    if is_set(&src.title) {
        t.set(LocalField::Title, local::META_TITLE, sanitize::text_field(&src.title));
    }
    if is_set(&src.desc) {
        t.set(LocalField::Desc, local::META_DESC, sanitize::textarea_field(&src.desc));
    }
    if is_set(&src.canonical) {
        let url = sanitize::url_raw(&src.canonical);
        if !url.is_empty() {
            t.set(LocalField::Canonical, local::CANONICAL, url);
        }
    }
    // Robots flags: any stored foreign value wins. Only "0" means "index".
    if !src.noindex.is_empty() {
        let action = if is_set(&src.noindex) {
            WriteAction::Set("1".to_string())
        } else {
            WriteAction::Delete
        };
        t.push(LocalField::Noindex, local::NOINDEX, action);
    }
    if !src.nofollow.is_empty() {
        let action = if is_set(&src.nofollow) {
            WriteAction::Set("0".to_string())
        } else {
            WriteAction::Delete
        };
        t.push(LocalField::Nofollow, local::ROBOTS_FOLLOW, action);
    }
    if !src.robots_adv.is_empty() {
        t.set(LocalField::RobotsAdv, local::ROBOTS_ADVANCED, sanitize::text_field(&src.robots_adv));
    }

    if is_set(&src.og_title) {
        t.set(LocalField::OgTitle, local::SOCIAL_TITLE, sanitize::text_field(&src.og_title));
    }
    if is_set(&src.og_desc) {
        t.set(LocalField::OgDesc, local::SOCIAL_DESC, sanitize::textarea_field(&src.og_desc));
    }
    let image = if is_set(&src.og_image) {
        &src.og_image
    } else {
        &src.tw_image
    };
    if is_set(image) {
        let url = sanitize::url_raw(image);
        if !url.is_empty() {
            t.set(LocalField::Image, local::SOCIAL_IMAGE, url);
        }
    }

    // Twitter values only fill social fields Open Graph left empty.
    if is_set(&src.tw_title) && !is_set(&t.effective(storage, local::SOCIAL_TITLE).await?) {
        t.set(LocalField::TwTitle, local::SOCIAL_TITLE, sanitize::text_field(&src.tw_title));
    }
    if is_set(&src.tw_desc) && !is_set(&t.effective(storage, local::SOCIAL_DESC).await?) {
        t.set(LocalField::TwDesc, local::SOCIAL_DESC, sanitize::textarea_field(&src.tw_desc));
    }
    if is_set(&src.breadcrumb_title) {
        t.set(
            LocalField::BreadcrumbTitle,
            local::BREADCRUMB_TITLE,
            sanitize::text_field(&src.breadcrumb_title),
        );
    }
    if let Ok(term) = src.primary_category.trim().parse::<u64>() {
        if term > 0 {
            t.set(LocalField::PrimaryCategory, local::PRIMARY_CATEGORY, term.to_string());
        }
    }

    Ok(t)
}

/// Persist a planned translation, one field at a time.
pub async fn apply(storage: &dyn StorageBackend, translation: &Translation) -> Result<()> {
    for write in &translation.writes {
        match &write.action {
            WriteAction::Set(value) => {
                storage.set_post_meta(translation.post_id, write.key, value).await?
            }
            WriteAction::Delete => {
                storage.delete_post_meta(translation.post_id, write.key).await?;
            }
        }
    }
    Ok(())
}

/// Translate one post. With `apply = false` this is a read-only simulation
/// reporting the fields that would change.
pub async fn translate(
    storage: &dyn StorageBackend,
    id: PostId,
    apply_changes: bool,
) -> Result<Vec<LocalField>> {
    let translation = plan(storage, id).await?;
    if apply_changes {
        apply(storage, &translation).await?;
    }
    Ok(translation.changes())
}
