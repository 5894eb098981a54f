use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeoMetaError {
    #[error("option {name} lost {attempts} compare-and-swap attempts")]
    VersionConflict { name: String, attempts: u32 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, SeoMetaError>;

impl From<serde_json::Error> for SeoMetaError {
    fn from(e: serde_json::Error) -> Self {
        SeoMetaError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for SeoMetaError {
    fn from(e: toml::de::Error) -> Self {
        SeoMetaError::Config(e.to_string())
    }
}
