//! Scoped forward-only iteration over one partition.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params_from_iter;
use tracing::warn;

use crate::codec::primitives::prefix_successor;
use crate::error::{IndexError, IndexResult};
use crate::partition::PartitionDefinition;

/// Cursor over the entries of one partition that start with a prefix.
///
/// The iterator owns a pooled connection holding an open read transaction,
/// so every page it fetches observes the same snapshot. Entries come back in
/// key order. The connection is released by [`close`](Self::close) or, if the
/// caller forgets, on drop.
pub struct IndexIterator {
    partition: Arc<PartitionDefinition>,
    conn: Option<PooledConnection<SqliteConnectionManager>>,
    store_closed: Arc<AtomicBool>,
    prefix: Vec<u8>,
    upper: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    page_size: u32,
    source_drained: bool,
    failed: bool,
}

impl IndexIterator {
    pub(crate) fn open(
        partition: Arc<PartitionDefinition>,
        conn: PooledConnection<SqliteConnectionManager>,
        store_closed: Arc<AtomicBool>,
        prefix: Vec<u8>,
        page_size: u32,
    ) -> IndexResult<Self> {
        conn.execute_batch("BEGIN")
            .map_err(|e| IndexError::engine("begin scan", Some(partition.name()), e))?;

        let upper = prefix_successor(&prefix);
        Ok(Self {
            partition,
            conn: Some(conn),
            store_closed,
            prefix,
            upper,
            last_key: None,
            buffer: VecDeque::new(),
            page_size: page_size.max(1),
            source_drained: false,
            failed: false,
        })
    }

    /// Name of the partition being iterated.
    pub fn partition(&self) -> &str {
        self.partition.name()
    }

    /// The prefix every returned key starts with.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Returns true once the iterator has been closed.
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Returns true if another entry is available.
    pub fn has_next(&mut self) -> IndexResult<bool> {
        self.ensure_usable()?;
        if self.buffer.is_empty() && !self.source_drained {
            self.fetch_page()?;
        }
        Ok(!self.buffer.is_empty())
    }

    /// Returns the next `(key, value)` pair.
    ///
    /// Calling this past the last entry is [`IndexError::IteratorExhausted`].
    pub fn next_entry(&mut self) -> IndexResult<(Vec<u8>, Vec<u8>)> {
        if !self.has_next()? {
            return Err(IndexError::IteratorExhausted {
                partition: self.partition.name().to_string(),
            });
        }
        self.buffer
            .pop_front()
            .ok_or_else(|| IndexError::IteratorExhausted {
                partition: self.partition.name().to_string(),
            })
    }

    /// Ends the read transaction and returns the connection to the pool.
    ///
    /// Closing an already closed iterator is a no-op.
    pub fn close(&mut self) -> IndexResult<()> {
        self.buffer.clear();
        match self.conn.take() {
            Some(conn) => conn
                .execute_batch("ROLLBACK")
                .map_err(|e| IndexError::engine("end scan", Some(self.partition.name()), e)),
            None => Ok(()),
        }
    }

    fn ensure_usable(&self) -> IndexResult<()> {
        if self.store_closed.load(Ordering::Acquire) {
            return Err(IndexError::StoreClosed);
        }
        if self.conn.is_none() {
            return Err(IndexError::IteratorClosed {
                partition: self.partition.name().to_string(),
            });
        }
        Ok(())
    }

    fn fetch_page(&mut self) -> IndexResult<()> {
        let name = self.partition.name();
        let conn = self.conn.as_ref().ok_or_else(|| IndexError::IteratorClosed {
            partition: name.to_string(),
        })?;

        let mut clauses = Vec::with_capacity(2);
        let mut bounds: Vec<&[u8]> = Vec::with_capacity(2);
        match &self.last_key {
            Some(last) => {
                clauses.push("k > ?");
                bounds.push(last);
            }
            None if !self.prefix.is_empty() => {
                clauses.push("k >= ?");
                bounds.push(&self.prefix);
            }
            None => {}
        }
        if let Some(upper) = &self.upper {
            clauses.push("k < ?");
            bounds.push(upper);
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT k, v FROM \"{}\" {} ORDER BY k LIMIT {}",
            self.partition.table(),
            filter,
            self.page_size
        );

        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| IndexError::engine("scan", Some(name), e))?;
        let rows = stmt
            .query_map(params_from_iter(bounds.iter()), |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| IndexError::engine("scan", Some(name), e))?;

        if rows.len() < self.page_size as usize {
            self.source_drained = true;
        }
        if let Some((key, _)) = rows.last() {
            self.last_key = Some(key.clone());
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl Iterator for IndexIterator {
    type Item = IndexResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.has_next() {
            Ok(true) => Some(self.next_entry()),
            Ok(false) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for IndexIterator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(
                partition = self.partition.name(),
                error = %e,
                "Failed to release index iterator"
            );
        }
    }
}

impl std::fmt::Debug for IndexIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexIterator")
            .field("partition", &self.partition.name())
            .field("prefix_len", &self.prefix.len())
            .field("buffered", &self.buffer.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
