use async_trait::async_trait;
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use serde_json::Value;
use tokio_rusqlite::Connection;

use super::{StorageBackend, VersionedValue};
use crate::error::{Result, SeoMetaError};
use crate::types::{Post, PostId, PostQuery, ProgressCommit};

/// SQLite-backed host store using bundled SQLite (zero system dependencies).
///
/// Mirrors the host platform's layout: an `options` table of JSON values, a
/// `posts` table and a single-valued `postmeta` table keyed by
/// `(post_id, meta_key)`.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub async fn new(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
                .await
                .map_err(|e: rusqlite::Error| SeoMetaError::Storage(e.to_string()))?
        } else {
            Connection::open(path)
                .await
                .map_err(|e: rusqlite::Error| SeoMetaError::Storage(e.to_string()))?
        };

        let storage = SqliteStorage { conn };
        storage.initialize().await?;
        Ok(storage)
    }
}

fn storage_err(e: tokio_rusqlite::Error) -> SeoMetaError {
    SeoMetaError::Storage(e.to_string())
}

/// Compare-and-swap on one option row. Version 0 means "must not exist yet".
fn cas_option(
    conn: &rusqlite::Connection,
    name: &str,
    expected_version: u64,
    text: &str,
) -> std::result::Result<Option<u64>, rusqlite::Error> {
    if expected_version == 0 {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO options (name, value, version) VALUES (?1, ?2, 1)",
            rusqlite::params![name, text],
        )?;
        return Ok((inserted == 1).then_some(1));
    }
    let updated = conn.execute(
        "UPDATE options SET value = ?2, version = version + 1, updated_at = datetime('now')
         WHERE name = ?1 AND version = ?3",
        rusqlite::params![name, text, expected_version as i64],
    )?;
    Ok((updated == 1).then_some(expected_version + 1))
}

fn push_param(params: &mut Vec<Box<dyn ToSql>>, value: Box<dyn ToSql>) -> String {
    params.push(value);
    format!("?{}", params.len())
}

/// Build the `FROM ... WHERE ...` part shared by selection and counting.
fn post_filter_sql(
    query: &PostQuery,
    with_paging: bool,
    params: &mut Vec<Box<dyn ToSql>>,
) -> String {
    let mut sql = " FROM posts p WHERE 1=1".to_string();

    if !query.post_types.is_empty() {
        let slots: Vec<String> = query
            .post_types
            .iter()
            .map(|t| push_param(params, Box::new(t.clone())))
            .collect();
        sql.push_str(&format!(" AND p.post_type IN ({})", slots.join(", ")));
    }
    if let Some(ref status) = query.status {
        let slot = push_param(params, Box::new(status.clone()));
        sql.push_str(&format!(" AND p.status = {slot}"));
    }
    if !query.any_meta_keys.is_empty() {
        let slots: Vec<String> = query
            .any_meta_keys
            .iter()
            .map(|k| push_param(params, Box::new(k.clone())))
            .collect();
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM postmeta m WHERE m.post_id = p.id AND m.meta_key IN ({}))",
            slots.join(", ")
        ));
    }
    if let Some(ref flag) = query.exclude_flagged {
        let slot = push_param(params, Box::new(flag.clone()));
        sql.push_str(&format!(
            " AND NOT EXISTS (SELECT 1 FROM postmeta c WHERE c.post_id = p.id AND c.meta_key = {slot} AND c.meta_value = '1')"
        ));
    }
    if with_paging {
        if let Some(after) = query.after {
            let slot = push_param(params, Box::new(after.0 as i64));
            sql.push_str(&format!(" AND p.id > {slot}"));
        }
    }
    sql
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        self.conn
            .call(|conn| -> std::result::Result<(), rusqlite::Error> {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode = WAL;
                    PRAGMA synchronous = NORMAL;
                    PRAGMA busy_timeout = 5000;
                    ",
                )?;

                conn.execute_batch(
                    "
                    CREATE TABLE IF NOT EXISTS options (
                        name TEXT PRIMARY KEY,
                        value TEXT NOT NULL,
                        version INTEGER NOT NULL DEFAULT 1,
                        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                    );
                    CREATE TABLE IF NOT EXISTS posts (
                        id INTEGER PRIMARY KEY,
                        post_type TEXT NOT NULL,
                        status TEXT NOT NULL,
                        title TEXT NOT NULL DEFAULT ''
                    );
                    CREATE TABLE IF NOT EXISTS postmeta (
                        post_id INTEGER NOT NULL,
                        meta_key TEXT NOT NULL,
                        meta_value TEXT NOT NULL,
                        PRIMARY KEY (post_id, meta_key)
                    );
                    CREATE INDEX IF NOT EXISTS idx_postmeta_key ON postmeta(meta_key, post_id);
                    CREATE INDEX IF NOT EXISTS idx_posts_status_type ON posts(status, post_type, id);
                    ",
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn get_option(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get_option_versioned(name).await?.map(|v| v.value))
    }

    async fn get_option_versioned(&self, name: &str) -> Result<Option<VersionedValue>> {
        let name = name.to_string();

        let row = self
            .conn
            .call(move |conn| -> std::result::Result<Option<(String, i64)>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT value, version FROM options WHERE name = ?1")?;
                let result = stmt
                    .query_row(rusqlite::params![name], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })
                    .optional()?;
                Ok(result)
            })
            .await
            .map_err(storage_err)?;

        match row {
            Some((text, version)) => Ok(Some(VersionedValue {
                value: serde_json::from_str(&text)?,
                version: version as u64,
            })),
            None => Ok(None),
        }
    }

    async fn set_option(&self, name: &str, value: &Value) -> Result<()> {
        let name = name.to_string();
        let text = serde_json::to_string(value)?;

        self.conn
            .call(move |conn| -> std::result::Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO options (name, value, version) VALUES (?1, ?2, 1)
                     ON CONFLICT(name) DO UPDATE SET
                        value = excluded.value,
                        version = options.version + 1,
                        updated_at = datetime('now')",
                    rusqlite::params![name, text],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn compare_and_set_option(
        &self,
        name: &str,
        expected_version: u64,
        value: &Value,
    ) -> Result<Option<u64>> {
        let name = name.to_string();
        let text = serde_json::to_string(value)?;

        self.conn
            .call(move |conn| -> std::result::Result<Option<u64>, rusqlite::Error> {
                cas_option(conn, &name, expected_version, &text)
            })
            .await
            .map_err(storage_err)
    }

    async fn delete_option(&self, name: &str) -> Result<bool> {
        let name = name.to_string();

        self.conn
            .call(move |conn| -> std::result::Result<bool, rusqlite::Error> {
                let count =
                    conn.execute("DELETE FROM options WHERE name = ?1", rusqlite::params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(storage_err)
    }

    async fn put_post(&self, post: &Post) -> Result<()> {
        let post = post.clone();

        self.conn
            .call(move |conn| -> std::result::Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT OR REPLACE INTO posts (id, post_type, status, title) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![post.id.0 as i64, post.post_type, post.status, post.title],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        self.conn
            .call(move |conn| -> std::result::Result<Option<Post>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT id, post_type, status, title FROM posts WHERE id = ?1")?;
                let result = stmt
                    .query_row(rusqlite::params![id.0 as i64], |row| {
                        Ok(Post {
                            id: PostId(row.get::<_, i64>(0)? as u64),
                            post_type: row.get(1)?,
                            status: row.get(2)?,
                            title: row.get(3)?,
                        })
                    })
                    .optional()?;
                Ok(result)
            })
            .await
            .map_err(storage_err)
    }

    async fn get_post_meta(&self, id: PostId, key: &str) -> Result<Option<String>> {
        let key = key.to_string();

        self.conn
            .call(move |conn| -> std::result::Result<Option<String>, rusqlite::Error> {
                let mut stmt = conn
                    .prepare("SELECT meta_value FROM postmeta WHERE post_id = ?1 AND meta_key = ?2")?;
                let result = stmt
                    .query_row(rusqlite::params![id.0 as i64, key], |row| row.get::<_, String>(0))
                    .optional()?;
                Ok(result)
            })
            .await
            .map_err(storage_err)
    }

    async fn set_post_meta(&self, id: PostId, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();

        self.conn
            .call(move |conn| -> std::result::Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                     ON CONFLICT(post_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                    rusqlite::params![id.0 as i64, key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn delete_post_meta(&self, id: PostId, key: &str) -> Result<bool> {
        let key = key.to_string();

        self.conn
            .call(move |conn| -> std::result::Result<bool, rusqlite::Error> {
                let count = conn.execute(
                    "DELETE FROM postmeta WHERE post_id = ?1 AND meta_key = ?2",
                    rusqlite::params![id.0 as i64, key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(storage_err)
    }

    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<PostId>> {
        let query = query.clone();

        self.conn
            .call(move |conn| -> std::result::Result<Vec<PostId>, rusqlite::Error> {
                let mut params: Vec<Box<dyn ToSql>> = Vec::new();
                let mut sql = format!("SELECT p.id{}", post_filter_sql(&query, true, &mut params));
                sql.push_str(" ORDER BY p.id ASC");
                if let Some(limit) = query.limit {
                    let slot = push_param(&mut params, Box::new(limit as i64));
                    sql.push_str(&format!(" LIMIT {slot}"));
                }

                let mut stmt = conn.prepare(&sql)?;
                let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, i64>(0))?;

                let mut ids = Vec::new();
                for row in rows {
                    ids.push(PostId(row? as u64));
                }
                Ok(ids)
            })
            .await
            .map_err(storage_err)
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<u64> {
        let query = query.clone();

        self.conn
            .call(move |conn| -> std::result::Result<u64, rusqlite::Error> {
                let mut params: Vec<Box<dyn ToSql>> = Vec::new();
                let sql = format!("SELECT COUNT(*){}", post_filter_sql(&query, false, &mut params));
                let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(storage_err)
    }

    async fn count_meta(&self, key: &str, value: Option<&str>, status: &str) -> Result<u64> {
        let key = key.to_string();
        let value = value.map(|v| v.to_string());
        let status = status.to_string();

        self.conn
            .call(move |conn| -> std::result::Result<u64, rusqlite::Error> {
                let count: i64 = match value {
                    Some(value) => conn.query_row(
                        "SELECT COUNT(*) FROM postmeta m JOIN posts p ON p.id = m.post_id
                         WHERE m.meta_key = ?1 AND m.meta_value = ?2 AND p.status = ?3",
                        rusqlite::params![key, value, status],
                        |row| row.get(0),
                    )?,
                    None => conn.query_row(
                        "SELECT COUNT(*) FROM postmeta m JOIN posts p ON p.id = m.post_id
                         WHERE m.meta_key = ?1 AND p.status = ?2",
                        rusqlite::params![key, status],
                        |row| row.get(0),
                    )?,
                };
                Ok(count as u64)
            })
            .await
            .map_err(storage_err)
    }

    async fn delete_meta_key(&self, key: &str) -> Result<u64> {
        let key = key.to_string();

        self.conn
            .call(move |conn| -> std::result::Result<u64, rusqlite::Error> {
                let count =
                    conn.execute("DELETE FROM postmeta WHERE meta_key = ?1", rusqlite::params![key])?;
                Ok(count as u64)
            })
            .await
            .map_err(storage_err)
    }

    async fn commit_progress(&self, commit: &ProgressCommit) -> Result<Option<u64>> {
        let commit = commit.clone();
        let text = serde_json::to_string(&commit.state)?;

        self.conn
            .call(move |conn| -> std::result::Result<Option<u64>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let Some(version) =
                    cas_option(&tx, &commit.state_option, commit.expected_version, &text)?
                else {
                    // Dropping the transaction rolls it back.
                    return Ok(None);
                };
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?1, ?2, '1')
                         ON CONFLICT(post_id, meta_key) DO UPDATE SET meta_value = '1'",
                    )?;
                    for id in &commit.marked {
                        stmt.execute(rusqlite::params![id.0 as i64, commit.marker_key])?;
                    }
                }
                tx.commit()?;
                Ok(Some(version))
            })
            .await
            .map_err(storage_err)
    }
}
