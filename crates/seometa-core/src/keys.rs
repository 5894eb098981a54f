//! Storage keys: the foreign plugins' schema and this system's own.

/// Per-post keys written by the SEO plugin being migrated away from.
pub mod foreign {
    pub const TITLE: &str = "_yoast_wpseo_title";
    pub const METADESC: &str = "_yoast_wpseo_metadesc";
    pub const CANONICAL: &str = "_yoast_wpseo_canonical";
    pub const NOINDEX: &str = "_yoast_wpseo_meta-robots-noindex";
    pub const NOFOLLOW: &str = "_yoast_wpseo_meta-robots-nofollow";
    pub const ROBOTS_ADV: &str = "_yoast_wpseo_meta-robots-adv";
    pub const OG_TITLE: &str = "_yoast_wpseo_opengraph-title";
    pub const OG_DESC: &str = "_yoast_wpseo_opengraph-description";
    pub const OG_IMAGE: &str = "_yoast_wpseo_opengraph-image";
    pub const TW_TITLE: &str = "_yoast_wpseo_twitter-title";
    pub const TW_DESC: &str = "_yoast_wpseo_twitter-description";
    pub const TW_IMAGE: &str = "_yoast_wpseo_twitter-image";
    pub const BREADCRUMB_TITLE: &str = "_yoast_wpseo_bctitle";
    pub const PRIMARY_CATEGORY: &str = "_yoast_wpseo_primary_category";

    /// Every key whose presence makes a post a migration candidate.
    pub const ALL: [&str; 14] = [
        TITLE,
        METADESC,
        CANONICAL,
        NOINDEX,
        NOFOLLOW,
        ROBOTS_ADV,
        OG_TITLE,
        OG_DESC,
        OG_IMAGE,
        TW_TITLE,
        TW_DESC,
        TW_IMAGE,
        BREADCRUMB_TITLE,
        PRIMARY_CATEGORY,
    ];

    /// Site-wide option blobs of the same plugin.
    pub const OPTION_TITLES: &str = "wpseo_titles";
    pub const OPTION_SOCIAL: &str = "wpseo_social";
    pub const OPTION_GENERAL: &str = "wpseo";

    /// Per-post code from the header/footer injection plugin.
    pub const HFG_HEADER: &str = "_hfg_header_scripts";
    pub const HFG_FOOTER: &str = "_hfg_footer_scripts";
}

/// Per-post keys owned by this system.
pub mod local {
    pub const META_TITLE: &str = "_seometa_meta_title";
    pub const META_DESC: &str = "_seometa_meta_desc";
    pub const CANONICAL: &str = "_seometa_canonical";
    /// `"1"` when the post must not be indexed.
    pub const NOINDEX: &str = "_seometa_noindex";
    /// `"1"` (default when absent) or `"0"`.
    pub const ROBOTS_FOLLOW: &str = "_seometa_robots_follow";
    /// Comma separated directives, e.g. `nosnippet,noarchive`.
    pub const ROBOTS_ADVANCED: &str = "_seometa_robots_advanced";
    pub const SOCIAL_TITLE: &str = "_seometa_social_title";
    pub const SOCIAL_DESC: &str = "_seometa_social_desc";
    pub const SOCIAL_IMAGE: &str = "_seometa_social_image";
    pub const BREADCRUMB_TITLE: &str = "_seometa_breadcrumb_title";
    pub const PRIMARY_CATEGORY: &str = "_seometa_primary_category";
    pub const HEAD_CODE: &str = "_seometa_head_code";
    pub const FOOT_CODE: &str = "_seometa_foot_code";
    pub const TLDR: &str = "_seometa_tldr";
    pub const VOICE_ENABLED: &str = "_seometa_voice_enabled";
    pub const FAQ: &str = "_seometa_faq";
    pub const HOWTO: &str = "_seometa_howto";
    pub const MAIN_ANSWER: &str = "_seometa_main_answer";
    pub const TWITTER_CARD: &str = "_seometa_twitter_card";
    pub const TWITTER_SITE: &str = "_seometa_twitter_site";
    pub const TWITTER_CREATOR: &str = "_seometa_twitter_creator";
    pub const SHARE_TWITTER_TEXT: &str = "_seometa_share_twitter_text";
    pub const SHARE_TWITTER_TAGS: &str = "_seometa_share_twitter_tags";
    pub const SHARE_FACEBOOK_TEXT: &str = "_seometa_share_facebook_text";
    pub const SHARE_LINKEDIN_TEXT: &str = "_seometa_share_linkedin_text";
    /// Completion marker set by the background migration.
    pub const MIGRATED: &str = "_seometa_migrated_yoast";

    /// Every per-post key removed on purge.
    pub const OWNED: [&str; 26] = [
        META_TITLE,
        META_DESC,
        CANONICAL,
        NOINDEX,
        ROBOTS_FOLLOW,
        ROBOTS_ADVANCED,
        SOCIAL_TITLE,
        SOCIAL_DESC,
        SOCIAL_IMAGE,
        BREADCRUMB_TITLE,
        PRIMARY_CATEGORY,
        HEAD_CODE,
        FOOT_CODE,
        TLDR,
        VOICE_ENABLED,
        FAQ,
        HOWTO,
        MAIN_ANSWER,
        TWITTER_CARD,
        TWITTER_SITE,
        TWITTER_CREATOR,
        SHARE_TWITTER_TEXT,
        SHARE_TWITTER_TAGS,
        SHARE_FACEBOOK_TEXT,
        SHARE_LINKEDIN_TEXT,
        MIGRATED,
    ];
}

/// Site-wide option names owned by this system.
pub mod options {
    pub const SETTINGS: &str = "seometa_options";
    pub const MIGRATION_STATE: &str = "seometa_migration";
    pub const CRON: &str = "seometa_cron";
}

/// Hook fired by the task runner to process one migration batch.
pub const MIGRATE_BATCH_HOOK: &str = "seometa_migrate_batch";
