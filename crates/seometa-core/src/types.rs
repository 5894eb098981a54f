use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a content item (post or page) in the host store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl PostId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A content item as the host platform stores it. Only the columns the
/// migration tooling filters on are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub post_type: String,
    pub status: String,
    pub title: String,
}

impl Post {
    pub fn new(id: u64, post_type: &str, status: &str, title: &str) -> Self {
        Post {
            id: PostId(id),
            post_type: post_type.to_string(),
            status: status.to_string(),
            title: title.to_string(),
        }
    }

    /// A published blog post.
    pub fn published(id: u64, title: &str) -> Self {
        Post::new(id, "post", "publish", title)
    }
}

/// A local field written by the translator, reported in change lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalField {
    Title,
    Desc,
    Canonical,
    Noindex,
    Nofollow,
    RobotsAdv,
    OgTitle,
    OgDesc,
    Image,
    TwTitle,
    TwDesc,
    BreadcrumbTitle,
    PrimaryCategory,
}

impl LocalField {
    pub fn as_str(self) -> &'static str {
        match self {
            LocalField::Title => "title",
            LocalField::Desc => "desc",
            LocalField::Canonical => "canonical",
            LocalField::Noindex => "noindex",
            LocalField::Nofollow => "nofollow",
            LocalField::RobotsAdv => "robots_adv",
            LocalField::OgTitle => "og_title",
            LocalField::OgDesc => "og_desc",
            LocalField::Image => "image",
            LocalField::TwTitle => "tw_title",
            LocalField::TwDesc => "tw_desc",
            LocalField::BreadcrumbTitle => "breadcrumb_title",
            LocalField::PrimaryCategory => "primary_category",
        }
    }
}

impl fmt::Display for LocalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter for selecting post identifiers from the host store.
///
/// Results are always ordered by ascending id so that keyset paging via
/// `after` never skips or revisits an item.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub post_types: Vec<String>,
    pub status: Option<String>,
    /// Keep posts carrying at least one of these meta keys (empty = no filter).
    pub any_meta_keys: Vec<String>,
    /// Drop posts whose value for this key equals `"1"`.
    pub exclude_flagged: Option<String>,
    /// Only ids strictly greater than this one.
    pub after: Option<PostId>,
    pub limit: Option<usize>,
}

/// One batch's worth of durable progress: the completion markers to set and
/// the state snapshot to swap in, applied atomically by the backend.
#[derive(Debug, Clone)]
pub struct ProgressCommit {
    pub state_option: String,
    pub expected_version: u64,
    pub state: serde_json::Value,
    pub marker_key: String,
    pub marked: Vec<PostId>,
}
