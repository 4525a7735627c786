//! Index store schema and partition layout catalog.
//!
//! Each partition lives in its own `WITHOUT ROWID` table keyed by the raw
//! key bytes. The `partition_layout` table records the codec and key geometry
//! every partition was first written with; reopening the store with a
//! registry that encodes a partition differently is refused, because the
//! existing keys would silently stop matching.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{IndexError, IndexResult};
use crate::partition::PartitionDefinition;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the store schema.
pub fn initialize_schema(conn: &Connection) -> IndexResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> IndexResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| IndexError::engine("create schema_version", None, e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| IndexError::engine("read schema_version", None, e))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> IndexResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| IndexError::engine("clear schema_version", None, e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| IndexError::engine("set schema_version", None, e))?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> IndexResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS partition_layout (
            name TEXT PRIMARY KEY,
            table_name TEXT NOT NULL UNIQUE,
            codec TEXT NOT NULL,
            prefix_len INTEGER NOT NULL,
            key_len INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| IndexError::engine("create partition_layout", None, e))?;
    Ok(())
}

/// Creates the table of a partition, or verifies its recorded layout.
pub fn ensure_partition(conn: &Connection, partition: &PartitionDefinition) -> IndexResult<()> {
    let name = partition.name();

    let stored: Option<(String, i64, i64)> = conn
        .query_row(
            "SELECT codec, prefix_len, key_len FROM partition_layout WHERE name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|e| IndexError::engine("read partition_layout", Some(name), e))?;

    let codec = partition.codec().name();
    match stored {
        Some((stored_codec, prefix, key))
            if stored_codec != codec
                || prefix as usize != partition.prefix_len()
                || key as usize != partition.key_len() =>
        {
            return Err(IndexError::LayoutMismatch {
                partition: name.to_string(),
                stored_codec,
                stored_prefix: prefix as usize,
                stored_key: key as usize,
                codec: codec.to_string(),
                prefix: partition.prefix_len(),
                key: partition.key_len(),
            });
        }
        Some(_) => {}
        None => {
            conn.execute(
                "INSERT INTO partition_layout (name, table_name, codec, prefix_len, key_len)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    name,
                    partition.table(),
                    codec,
                    partition.prefix_len() as i64,
                    partition.key_len() as i64,
                ],
            )
            .map_err(|e| IndexError::engine("record partition_layout", Some(name), e))?;
        }
    }

    // Table names are derived from [a-z0-9_] only, so quoting is enough.
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                k BLOB PRIMARY KEY,
                v BLOB NOT NULL
            ) WITHOUT ROWID",
            partition.table()
        ),
        [],
    )
    .map_err(|e| IndexError::engine("create partition table", Some(name), e))?;

    Ok(())
}

/// Lists the partitions recorded in the layout catalog.
pub fn recorded_partitions(conn: &Connection) -> IndexResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM partition_layout ORDER BY name")
        .map_err(|e| IndexError::engine("list partition_layout", None, e))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| IndexError::engine("list partition_layout", None, e))?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionCompiler;

    #[test]
    fn test_schema_initialization() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // idempotent
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_partition_tables_are_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let registry = PartitionCompiler::standard().compile().unwrap();
        for partition in registry.iter() {
            ensure_partition(&conn, partition).unwrap();
        }
        // reopening with the same layout is accepted
        for partition in registry.iter() {
            ensure_partition(&conn, partition).unwrap();
        }

        let recorded = recorded_partitions(&conn).unwrap();
        assert_eq!(recorded.len(), registry.len());
        assert!(recorded.iter().any(|name| name == "CodeSystem.$lookup"));
    }

    #[test]
    fn test_layout_mismatch_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let registry = PartitionCompiler::standard().compile().unwrap();
        let url = registry.get("CodeSystem.url").unwrap();
        ensure_partition(&conn, &url).unwrap();

        conn.execute(
            "UPDATE partition_layout SET key_len = 12 WHERE name = 'CodeSystem.url'",
            [],
        )
        .unwrap();
        let err = ensure_partition(&conn, &url).unwrap_err();
        assert!(matches!(
            err,
            IndexError::LayoutMismatch {
                stored_key: 12,
                key: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_codec_change_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let registry = PartitionCompiler::standard().compile().unwrap();
        let url = registry.get("CodeSystem.url").unwrap();
        ensure_partition(&conn, &url).unwrap();

        conn.execute(
            "UPDATE partition_layout SET codec = 'string-hash' WHERE name = 'CodeSystem.url'",
            [],
        )
        .unwrap();
        match ensure_partition(&conn, &url).unwrap_err() {
            IndexError::LayoutMismatch {
                stored_codec,
                codec,
                ..
            } => {
                assert_eq!(stored_codec, "string-hash");
                assert_eq!(codec, "uri-hash");
            }
            other => panic!("expected LayoutMismatch, got {:?}", other),
        }
    }
}
