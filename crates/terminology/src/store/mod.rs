//! Index store.
//!
//! The [`IndexStore`] binds every compiled partition to an isolated keyspace
//! in one SQLite database: one `WITHOUT ROWID` table per partition, keyed by
//! the raw key bytes, so SQLite's B-tree order is the byte order the key
//! codecs were designed for.
//!
//! # Durability
//!
//! The database runs in WAL mode with `synchronous = FULL`. A [`WriteBatch`]
//! is applied in one `IMMEDIATE` transaction: after a crash during
//! submission, recovery sees either none or all of the batch. Readers never
//! observe a partially applied batch.
//!
//! # Lifecycle
//!
//! The store is opened once at startup and shared through an `Arc`.
//! [`IndexStore::close`] is the explicit shutdown path: it checkpoints the WAL,
//! and every later call, including calls on live iterators, fails with
//! [`IndexError::StoreClosed`].

mod batch;
mod iterator;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::config::IndexStoreConfig;
use crate::error::{IndexError, IndexResult};
use crate::partition::{PartitionDefinition, PartitionRegistry};

pub use batch::{BatchOp, IndexEntry, WriteBatch};
pub use iterator::IndexIterator;

/// Persistent, partitioned, ordered key-value index.
pub struct IndexStore {
    pool: Pool<SqliteConnectionManager>,
    registry: Arc<PartitionRegistry>,
    config: IndexStoreConfig,
    path: PathBuf,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("partitions", &self.registry.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl IndexStore {
    /// Opens or creates the store at `path` for the partitions of `registry`.
    ///
    /// Creates a table for every new partition and verifies the recorded
    /// layout of every existing one.
    pub fn open<P: AsRef<Path>>(
        path: P,
        registry: Arc<PartitionRegistry>,
        config: IndexStoreConfig,
    ) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();

        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let enable_wal = config.enable_wal;
        let synchronous = if config.synchronous_full { "FULL" } else { "NORMAL" };
        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            conn.pragma_update(None, "synchronous", synchronous)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| IndexError::Pool {
                message: e.to_string(),
            })?;

        {
            let mut conn = pool.get().map_err(|e| IndexError::Pool {
                message: e.to_string(),
            })?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| IndexError::engine("open", None, e))?;
            schema::initialize_schema(&tx)?;
            for partition in registry.iter() {
                schema::ensure_partition(&tx, partition)?;
            }
            tx.commit()
                .map_err(|e| IndexError::engine("open", None, e))?;
        }

        info!(
            path = %path.display(),
            partitions = registry.len(),
            "Opened index store"
        );

        Ok(Self {
            pool,
            registry,
            config,
            path,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The compiled partitions this store serves.
    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &IndexStoreConfig {
        &self.config
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get a connection from the pool.
    fn connection(&self) -> IndexResult<PooledConnection<SqliteConnectionManager>> {
        if self.is_closed() {
            return Err(IndexError::StoreClosed);
        }
        self.pool.get().map_err(|e| IndexError::Pool {
            message: e.to_string(),
        })
    }

    fn partition(&self, name: &str) -> IndexResult<Arc<PartitionDefinition>> {
        self.registry
            .get(name)
            .ok_or_else(|| IndexError::UnknownPartition {
                name: name.to_string(),
            })
    }

    fn check_key(partition: &PartitionDefinition, key: &[u8]) -> IndexResult<()> {
        if key.len() != partition.key_len() {
            return Err(IndexError::KeyLength {
                partition: partition.name().to_string(),
                expected: partition.key_len(),
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Inserts or replaces one entry. Writing the same entry twice is a no-op.
    pub fn put(&self, partition: &str, key: &[u8], value: &[u8]) -> IndexResult<()> {
        let def = self.partition(partition)?;
        Self::check_key(&def, key)?;
        let conn = self.connection()?;
        conn.prepare_cached(&put_sql(&def))
            .and_then(|mut stmt| stmt.execute(params![key, value]))
            .map_err(|e| IndexError::engine("put", Some(partition), e))?;
        Ok(())
    }

    /// Removes one entry. Returns whether the key existed.
    pub fn delete(&self, partition: &str, key: &[u8]) -> IndexResult<bool> {
        let def = self.partition(partition)?;
        Self::check_key(&def, key)?;
        let conn = self.connection()?;
        let removed = conn
            .prepare_cached(&delete_sql(&def))
            .and_then(|mut stmt| stmt.execute(params![key]))
            .map_err(|e| IndexError::engine("delete", Some(partition), e))?;
        Ok(removed > 0)
    }

    /// Point lookup. A missing key is `Ok(None)`.
    pub fn seek(&self, partition: &str, key: &[u8]) -> IndexResult<Option<Vec<u8>>> {
        let def = self.partition(partition)?;
        Self::check_key(&def, key)?;
        let conn = self.connection()?;
        conn.prepare_cached(&format!("SELECT v FROM \"{}\" WHERE k = ?1", def.table()))
            .and_then(|mut stmt| {
                stmt.query_row(params![key], |row| row.get::<_, Vec<u8>>(0))
                    .optional()
            })
            .map_err(|e| IndexError::engine("seek", Some(partition), e))
    }

    /// Creates an empty batch.
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    /// Applies every staged operation of `batch` in one transaction.
    ///
    /// Any failure (unknown partition, wrong key length, engine error) rolls
    /// back the whole batch. Returns the number of operations applied.
    pub fn submit(&self, batch: WriteBatch) -> IndexResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| IndexError::engine("begin batch", None, e))?;

        // Dropping `tx` on any early return rolls the batch back.
        for op in batch.into_ops() {
            let def = self.partition(op.partition())?;
            Self::check_key(&def, op.key())?;
            let result = match &op {
                BatchOp::Put(entry) => tx
                    .prepare_cached(&put_sql(&def))
                    .and_then(|mut stmt| stmt.execute(params![entry.key, entry.value])),
                BatchOp::Delete { key, .. } => tx
                    .prepare_cached(&delete_sql(&def))
                    .and_then(|mut stmt| stmt.execute(params![key])),
            };
            result.map_err(|e| IndexError::engine("batch", Some(def.name()), e))?;
        }

        tx.commit()
            .map_err(|e| IndexError::engine("commit batch", None, e))?;

        debug!(entries = count, "Submitted index batch");
        Ok(count)
    }

    /// Opens an iterator over `partition`, restricted to keys starting with
    /// `prefix` when one is given.
    pub fn iterate(&self, partition: &str, prefix: Option<&[u8]>) -> IndexResult<IndexIterator> {
        let def = self.partition(partition)?;
        let prefix = prefix.unwrap_or_default();
        if prefix.len() > def.key_len() {
            return Err(IndexError::KeyLength {
                partition: partition.to_string(),
                expected: def.key_len(),
                actual: prefix.len(),
            });
        }
        let conn = self.connection()?;
        IndexIterator::open(
            def,
            conn,
            Arc::clone(&self.closed),
            prefix.to_vec(),
            self.config.scan_page_size,
        )
    }

    /// Collects every entry under `prefix`, closing the iterator afterwards.
    pub fn scan_prefix(
        &self,
        partition: &str,
        prefix: &[u8],
    ) -> IndexResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut iter = self.iterate(partition, Some(prefix))?;
        let entries = iter.by_ref().collect::<IndexResult<Vec<_>>>();
        iter.close()?;
        let entries = entries?;
        debug!(partition, entries = entries.len(), "Prefix scan");
        Ok(entries)
    }

    /// Number of entries in a partition.
    pub fn count(&self, partition: &str) -> IndexResult<u64> {
        let def = self.partition(partition)?;
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", def.table()), [], |row| {
                row.get(0)
            })
            .map_err(|e| IndexError::engine("count", Some(partition), e))?;
        Ok(count as u64)
    }

    /// Partition names recorded in the on-disk layout catalog.
    pub fn recorded_partitions(&self) -> IndexResult<Vec<String>> {
        let conn = self.connection()?;
        schema::recorded_partitions(&conn)
    }

    /// Closes the store. Idempotent.
    ///
    /// Checkpoints as much of the WAL as live readers allow, without waiting
    /// on them. Connections are returned to the pool and released when the
    /// last handle drops.
    pub fn close(&self) -> IndexResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if self.config.enable_wal {
            let conn = self.pool.get().map_err(|e| IndexError::Pool {
                message: e.to_string(),
            })?;
            let (log, checkpointed): (i64, i64) = conn
                .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |row| {
                    Ok((row.get(1)?, row.get(2)?))
                })
                .map_err(|e| IndexError::engine("checkpoint", None, e))?;
            if checkpointed < log {
                warn!(
                    path = %self.path.display(),
                    log,
                    checkpointed,
                    "WAL checkpoint incomplete, readers still open"
                );
            } else {
                debug!(log, "Checkpointed WAL");
            }
        }

        info!(path = %self.path.display(), "Closed index store");
        Ok(())
    }
}

fn put_sql(partition: &PartitionDefinition) -> String {
    format!(
        "INSERT OR REPLACE INTO \"{}\" (k, v) VALUES (?1, ?2)",
        partition.table()
    )
}

fn delete_sql(partition: &PartitionDefinition) -> String {
    format!("DELETE FROM \"{}\" WHERE k = ?1", partition.table())
}
