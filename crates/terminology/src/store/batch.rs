//! Write batches.

/// One `(partition, key, value)` index entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    /// Partition name.
    pub partition: String,
    /// Full key.
    pub key: Vec<u8>,
    /// Value bytes; empty for search partitions.
    pub value: Vec<u8>,
}

impl IndexEntry {
    /// Creates an entry.
    pub fn new(partition: impl Into<String>, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            partition: partition.into(),
            key,
            value,
        }
    }
}

/// A staged batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or replace an entry.
    Put(IndexEntry),
    /// Remove a key.
    Delete {
        /// Partition name.
        partition: String,
        /// Full key.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// The partition this operation targets.
    pub fn partition(&self) -> &str {
        match self {
            BatchOp::Put(entry) => &entry.partition,
            BatchOp::Delete { partition, .. } => partition,
        }
    }

    /// The key this operation targets.
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put(entry) => &entry.key,
            BatchOp::Delete { key, .. } => key,
        }
    }
}

/// Accumulator of puts and deletes across partitions.
///
/// Nothing is written until the batch is passed to
/// [`IndexStore::submit`](super::IndexStore::submit), which applies every
/// staged operation in one transaction and consumes the batch. Operations are
/// applied in staging order, so a delete followed by a put of the same key
/// leaves the key present.
#[derive(Debug, Clone, Default)]
#[must_use = "a batch does nothing until it is submitted"]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put.
    pub fn put(&mut self, partition: impl Into<String>, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put(IndexEntry::new(partition, key, value)));
        self
    }

    /// Stages a put for every entry.
    pub fn put_all<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        self.ops.extend(entries.into_iter().map(BatchOp::Put));
        self
    }

    /// Stages a delete.
    pub fn delete(&mut self, partition: impl Into<String>, key: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            partition: partition.into(),
            key,
        });
        self
    }

    /// Stages a delete for the key of every entry.
    pub fn delete_all<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        self.ops.extend(entries.into_iter().map(|entry| BatchOp::Delete {
            partition: entry.partition,
            key: entry.key,
        }));
        self
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Staged operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_preserves_staging_order() {
        let mut batch = WriteBatch::new();
        batch
            .delete("p", vec![1])
            .put("p", vec![1], vec![9])
            .put_all(vec![IndexEntry::new("q", vec![2], Vec::new())]);

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.ops()[0], BatchOp::Delete { .. }));
        assert_eq!(batch.ops()[1].key(), &[1]);
        assert_eq!(batch.ops()[2].partition(), "q");
    }

    #[test]
    fn test_delete_all_drops_values() {
        let mut batch = WriteBatch::new();
        batch.delete_all(vec![
            IndexEntry::new("p", vec![1], vec![7]),
            IndexEntry::new("p", vec![2], vec![8]),
        ]);
        assert_eq!(
            batch.ops()[1],
            BatchOp::Delete {
                partition: "p".to_string(),
                key: vec![2]
            }
        );
    }
}
