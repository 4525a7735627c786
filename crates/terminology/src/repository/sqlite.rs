//! SQLite resource repository.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::error::RepositoryError;
use crate::model::{ResourceId, ResourceType};

use super::{EnvelopeDraft, RepositoryResult, ResourceEnvelope, ResourceRepository};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Resource repository backed by its own SQLite database file.
pub struct SqliteResourceRepository {
    pool: Pool<SqliteConnectionManager>,
    config: RepositoryConfig,
}

impl std::fmt::Debug for SqliteResourceRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteResourceRepository")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteResourceRepository {
    /// Opens or creates the repository database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: RepositoryConfig) -> RepositoryResult<Self> {
        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(1))
            .build(manager)
            .map_err(|e| RepositoryError::Pool {
                message: e.to_string(),
            })?;

        let repository = Self { pool, config };
        repository.init_schema()?;

        info!(path = %path.as_ref().display(), "Opened resource repository");
        Ok(repository)
    }

    /// Returns the repository configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn connection(&self) -> RepositoryResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| RepositoryError::Pool {
            message: e.to_string(),
        })
    }

    fn init_schema(&self) -> RepositoryResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| engine("create schema_version", e))?;

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| engine("read schema_version", e))?;

        if version.is_none() {
            // AUTOINCREMENT: ids are never reused after a delete.
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS resources (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    resource_type TEXT NOT NULL,
                    version_id INTEGER NOT NULL,
                    data BLOB NOT NULL,
                    last_updated TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_resources_type ON resources(resource_type, id);",
            )
            .map_err(|e| engine("create resources", e))?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map_err(|e| engine("set schema_version", e))?;
        }

        Ok(())
    }
}

fn engine(operation: &'static str, source: rusqlite::Error) -> RepositoryError {
    RepositoryError::Engine { operation, source }
}

fn serialize(id: Option<ResourceId>, content: &Value) -> RepositoryResult<Vec<u8>> {
    serde_json::to_vec(content).map_err(|e| RepositoryError::Serialization {
        id,
        message: e.to_string(),
    })
}

fn load(conn: &Connection, id: ResourceId) -> RepositoryResult<Option<ResourceEnvelope>> {
    let row: Option<(String, i64, Vec<u8>, String)> = conn
        .query_row(
            "SELECT resource_type, version_id, data, last_updated FROM resources WHERE id = ?1",
            [id.get()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(|e| engine("find_by_id", e))?;

    let Some((resource_type, version_id, data, last_updated)) = row else {
        return Ok(None);
    };

    let resource_type: ResourceType =
        resource_type
            .parse()
            .map_err(|_| RepositoryError::UnknownResourceType {
                id,
                resource_type: resource_type.clone(),
            })?;
    let content = serde_json::from_slice(&data).map_err(|e| RepositoryError::Serialization {
        id: Some(id),
        message: e.to_string(),
    })?;
    let last_updated = DateTime::parse_from_rfc3339(&last_updated)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Serialization {
            id: Some(id),
            message: format!("invalid last_updated: {}", e),
        })?;

    Ok(Some(ResourceEnvelope {
        id,
        resource_type,
        version_id: version_id as u32,
        last_updated,
        content,
    }))
}

impl ResourceRepository for SqliteResourceRepository {
    fn save(&self, draft: EnvelopeDraft) -> RepositoryResult<ResourceEnvelope> {
        let data = serialize(draft.id, &draft.content)?;
        let now = Utc::now();
        let last_updated = now.to_rfc3339();

        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(|e| engine("save", e))?;

        let (id, version_id) = match draft.id {
            None => {
                tx.execute(
                    "INSERT INTO resources (resource_type, version_id, data, last_updated)
                     VALUES (?1, 1, ?2, ?3)",
                    params![draft.resource_type.as_str(), data, last_updated],
                )
                .map_err(|e| engine("save", e))?;
                (ResourceId::try_from(tx.last_insert_rowid())?, 1)
            }
            Some(id) => {
                let bumped: Option<i64> = tx
                    .query_row(
                        "UPDATE resources
                         SET version_id = version_id + 1, data = ?1, last_updated = ?2
                         WHERE id = ?3 AND resource_type = ?4
                         RETURNING version_id",
                        params![data, last_updated, id.get(), draft.resource_type.as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| engine("save", e))?;
                match bumped {
                    Some(version_id) => (id, version_id as u32),
                    None => {
                        tx.execute(
                            "INSERT INTO resources (id, resource_type, version_id, data, last_updated)
                             VALUES (?1, ?2, 1, ?3, ?4)",
                            params![id.get(), draft.resource_type.as_str(), data, last_updated],
                        )
                        .map_err(|e| engine("save", e))?;
                        (id, 1)
                    }
                }
            }
        };

        tx.commit().map_err(|e| engine("save", e))?;
        debug!(resource_id = %id, version_id, "Saved resource envelope");

        Ok(ResourceEnvelope {
            id,
            resource_type: draft.resource_type,
            version_id,
            last_updated: now,
            content: draft.content,
        })
    }

    fn find_by_id(&self, id: ResourceId) -> RepositoryResult<Option<ResourceEnvelope>> {
        let conn = self.connection()?;
        load(&conn, id)
    }

    fn delete_by_id(&self, id: ResourceId) -> RepositoryResult<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute("DELETE FROM resources WHERE id = ?1", [id.get()])
            .map_err(|e| engine("delete_by_id", e))?;
        Ok(removed > 0)
    }

    fn find_ids_by_type(&self, resource_type: ResourceType) -> RepositoryResult<Vec<ResourceId>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare_cached("SELECT id FROM resources WHERE resource_type = ?1 ORDER BY id")
            .map_err(|e| engine("find_ids_by_type", e))?;
        let ids = stmt
            .query_map([resource_type.as_str()], |row| row.get::<_, i64>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| engine("find_ids_by_type", e))?;
        ids.into_iter().map(ResourceId::try_from).collect()
    }
}
