//! The site-wide settings blob.
//!
//! Only the sections the migration tooling reads or writes are typed; every
//! other key is carried through `extra` so a load/save round-trip never drops
//! settings owned by other parts of the system.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::keys;
use crate::storage::StorageBackend;

/// A typed section; anything but an object (PHP stores an empty array as
/// `[]`) reads as the section's default.
fn section<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(T::default()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, deserialize_with = "section")]
    pub templates: Templates,
    #[serde(default, deserialize_with = "section")]
    pub social: Social,
    #[serde(default, deserialize_with = "section")]
    pub site: Site,
    #[serde(default, deserialize_with = "section")]
    pub flags: Flags,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Templates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    #[serde(default, deserialize_with = "section")]
    pub home: HomeTemplate,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Social {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
    #[serde(default, deserialize_with = "section")]
    pub twitter: TwitterSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwitterSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags {
    /// Set once a migration (background or one-time) has run to completion.
    #[serde(default)]
    pub migration_yoast_done: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Load the blob; a missing or non-object value yields defaults.
    pub async fn load(storage: &dyn StorageBackend) -> Result<Settings> {
        match storage.get_option(keys::options::SETTINGS).await? {
            Some(value @ Value::Object(_)) => Ok(serde_json::from_value(value)?),
            _ => Ok(Settings::default()),
        }
    }

    pub async fn save(&self, storage: &dyn StorageBackend) -> Result<()> {
        let value = serde_json::to_value(self)?;
        storage.set_option(keys::options::SETTINGS, &value).await
    }

    /// Persist the "migration done" flag. Works on the raw blob so that no
    /// other key, however it is shaped, can make this write fail.
    pub async fn mark_migration_done(storage: &dyn StorageBackend) -> Result<()> {
        let mut blob = match storage.get_option(keys::options::SETTINGS).await? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let flags = blob
            .entry("flags")
            .or_insert_with(|| Value::Object(Map::new()));
        if !flags.is_object() {
            *flags = Value::Object(Map::new());
        }
        if let Value::Object(flags) = flags {
            flags.insert("migration_yoast_done".to_string(), Value::Bool(true));
        }
        storage
            .set_option(keys::options::SETTINGS, &Value::Object(blob))
            .await
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
