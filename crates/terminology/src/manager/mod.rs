//! Persistence manager.
//!
//! A [`ResourceManager`] keeps the envelope repository and the index store in
//! step for one resource type. Writes go envelope first, then one index
//! batch; when the batch fails the envelope change is compensated before the
//! error is surfaced, so a failed write never leaves a searchable resource
//! without its entries or an envelope the index cannot see.
//!
//! Reads always go through the repository: an index hit whose envelope is
//! gone, or whose content does not actually contain the searched value
//! (a 4-byte hash collision), is discarded.

mod locks;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::codec::IndexValue;
use crate::error::{
    CodecError, ConsistencyError, IndexError, RepositoryError, RequestError, TerminologyError,
    TerminologyResult,
};
use crate::model::{Element, ResourceId, ResourceType};
use crate::partition::{OperationKind, PartitionDefinition};
use crate::repository::{EnvelopeDraft, ResourceEnvelope, ResourceRepository};
use crate::store::{IndexEntry, IndexStore};

use locks::StripedLocks;

/// Elements extracted from one resource, grouped by partition.
type Extracted = Vec<(Arc<PartitionDefinition>, Vec<Element>)>;

/// A decoded entry of an operation partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHit {
    /// Raw key.
    pub key: Vec<u8>,
    /// Resource the entry was derived from.
    pub resource_id: ResourceId,
    /// Decoded value.
    pub value: IndexValue,
}

/// Keeps envelopes and index entries of one resource type consistent.
pub struct ResourceManager {
    resource_type: ResourceType,
    store: Arc<IndexStore>,
    repository: Arc<dyn ResourceRepository>,
    partitions: Vec<Arc<PartitionDefinition>>,
    locks: StripedLocks,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("resource_type", &self.resource_type)
            .field(
                "partitions",
                &self.partitions.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ResourceManager {
    /// Creates the manager of `resource_type` over a shared store and
    /// repository.
    pub fn new(
        resource_type: ResourceType,
        store: Arc<IndexStore>,
        repository: Arc<dyn ResourceRepository>,
    ) -> Self {
        let partitions = store.registry().partitions_for(resource_type);
        Self {
            resource_type,
            store,
            repository,
            partitions,
            locks: StripedLocks::new(),
        }
    }

    /// The managed resource type.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Partitions indexing the managed type.
    pub fn partitions(&self) -> &[Arc<PartitionDefinition>] {
        &self.partitions
    }

    /// Persists a new resource and indexes it.
    pub fn create(&self, content: Value) -> TerminologyResult<ResourceEnvelope> {
        self.check_type(&content)?;
        let extracted = self.extract(&content)?;

        let envelope = self
            .repository
            .save(EnvelopeDraft::new(self.resource_type, content))?;
        let id = envelope.id;
        let _guard = self.locks.lock(id);

        let written = Self::encode(&extracted, id)
            .map_err(IndexError::from)
            .and_then(|entries| {
                let mut batch = self.store.batch();
                batch.put_all(entries);
                self.store.submit(batch)
            });

        match written {
            Ok(entries) => {
                debug!(
                    resource_type = %self.resource_type,
                    resource_id = %id,
                    entries,
                    "Created resource"
                );
                Ok(envelope)
            }
            Err(index_error) => {
                warn!(
                    resource_type = %self.resource_type,
                    resource_id = %id,
                    error = %index_error,
                    "Index write failed, removing orphaned envelope"
                );
                let compensation = self.repository.delete_by_id(id).map(|_| ());
                Err(self.compensated(id, index_error, compensation).into())
            }
        }
    }

    /// Loads a resource. Envelopes of another type read as `None`.
    pub fn read(&self, id: ResourceId) -> TerminologyResult<Option<ResourceEnvelope>> {
        Ok(self
            .repository
            .find_by_id(id)?
            .filter(|envelope| envelope.resource_type == self.resource_type))
    }

    /// Replaces the content of a resource and swaps its index entries in one
    /// batch.
    pub fn update(&self, id: ResourceId, content: Value) -> TerminologyResult<ResourceEnvelope> {
        self.check_type(&content)?;
        let _guard = self.locks.lock(id);

        let current = self.read(id)?.ok_or(RequestError::NotFound {
            resource_type: self.resource_type,
            id,
        })?;
        let stale = self.entries(&current.content, id)?;
        let extracted = self.extract(&content)?;

        let envelope = self
            .repository
            .save(EnvelopeDraft::existing(id, self.resource_type, content))?;

        let written = Self::encode(&extracted, id)
            .map_err(IndexError::from)
            .and_then(|entries| {
                let mut batch = self.store.batch();
                batch.delete_all(stale).put_all(entries);
                self.store.submit(batch)
            });

        match written {
            Ok(entries) => {
                debug!(
                    resource_type = %self.resource_type,
                    resource_id = %id,
                    version_id = envelope.version_id,
                    entries,
                    "Updated resource"
                );
                Ok(envelope)
            }
            Err(index_error) => {
                warn!(
                    resource_type = %self.resource_type,
                    resource_id = %id,
                    error = %index_error,
                    "Index write failed, restoring previous content"
                );
                let compensation = self
                    .repository
                    .save(EnvelopeDraft::existing(id, self.resource_type, current.content))
                    .map(|_| ());
                Err(self.compensated(id, index_error, compensation).into())
            }
        }
    }

    /// Deletes a resource and every index entry derived from it.
    ///
    /// Returns `false` if no resource of the managed type had this id.
    pub fn delete(&self, id: ResourceId) -> TerminologyResult<bool> {
        let _guard = self.locks.lock(id);

        let Some(current) = self.read(id)? else {
            return Ok(false);
        };
        let entries = self.entries(&current.content, id)?;

        if !self.repository.delete_by_id(id)? {
            return Ok(false);
        }

        let mut batch = self.store.batch();
        batch.delete_all(entries);
        self.store.submit(batch).map_err(|source| {
            warn!(
                resource_type = %self.resource_type,
                resource_id = %id,
                error = %source,
                "Envelope deleted but index entries remain"
            );
            ConsistencyError::StaleEntries {
                resource_type: self.resource_type,
                id,
                source,
            }
        })?;

        debug!(resource_type = %self.resource_type, resource_id = %id, "Deleted resource");
        Ok(true)
    }

    /// Finds resources whose `param` equals `value`.
    ///
    /// Results are ordered by id. Every candidate from the prefix scan is
    /// resolved and re-checked against the query.
    pub fn search(&self, param: &str, value: &str) -> TerminologyResult<Vec<ResourceEnvelope>> {
        let unknown = || RequestError::UnknownParameter {
            resource_type: self.resource_type,
            param: param.to_string(),
        };
        let partition = self
            .store
            .registry()
            .search_partition(self.resource_type, param)
            .ok_or_else(unknown)?;
        let element_type = partition.element_type().ok_or_else(unknown)?;

        let query = element_type.parse_query(param, value)?;
        let prefix = partition
            .prefix(&query)
            .map_err(|e| invalid_value(param, value, e))?;

        let mut matches = Vec::new();
        for id in self.scan_ids(&partition, &prefix)? {
            let Some(envelope) = self.read(id)? else {
                continue;
            };
            if partition.contains(&envelope.content, &query)? {
                matches.push(envelope);
            }
        }

        debug!(
            resource_type = %self.resource_type,
            param,
            matches = matches.len(),
            "Search"
        );
        Ok(matches)
    }

    /// Rewrites every index entry of one resource. Returns the entry count.
    ///
    /// Entries are upserts, so reindexing is idempotent.
    pub fn reindex(&self, id: ResourceId) -> TerminologyResult<usize> {
        let _guard = self.locks.lock(id);
        let Some(current) = self.read(id)? else {
            return Err(RequestError::NotFound {
                resource_type: self.resource_type,
                id,
            }
            .into());
        };
        let mut batch = self.store.batch();
        batch.put_all(self.entries(&current.content, id)?);
        Ok(self.store.submit(batch)?)
    }

    /// Reindexes every stored resource of the managed type.
    pub fn reindex_all(&self) -> TerminologyResult<usize> {
        let mut total = 0;
        for id in self.repository.find_ids_by_type(self.resource_type)? {
            total += self.reindex(id)?;
        }
        debug!(resource_type = %self.resource_type, entries = total, "Reindexed resources");
        Ok(total)
    }

    /// Scans an operation partition of the managed type and decodes every
    /// entry under `prefix`, in key order.
    pub fn scan_operation(
        &self,
        kind: OperationKind,
        prefix: &[u8],
    ) -> TerminologyResult<Vec<OperationHit>> {
        let partition = self
            .store
            .registry()
            .operation(kind)
            .filter(|p| p.resource_type() == self.resource_type)
            .ok_or_else(|| IndexError::UnknownPartition {
                name: format!("{}.{}", self.resource_type, kind),
            })?;

        let mut hits = Vec::new();
        for (key, bytes) in self.store.scan_prefix(partition.name(), prefix)? {
            let Some(resource_id) = partition.resource_id(&key) else {
                continue;
            };
            let Some(value) = partition.decode_value(&bytes)? else {
                continue;
            };
            hits.push(OperationHit {
                key,
                resource_id,
                value,
            });
        }
        Ok(hits)
    }

    /// Index entries derived from `content` for resource `id`.
    pub fn entries(&self, content: &Value, id: ResourceId) -> TerminologyResult<Vec<IndexEntry>> {
        let extracted = self.extract(content)?;
        Ok(Self::encode(&extracted, id)?)
    }

    fn check_type(&self, content: &Value) -> Result<(), RequestError> {
        match content.get("resourceType").and_then(Value::as_str) {
            Some(found) if found == self.resource_type.as_str() => Ok(()),
            found => Err(RequestError::ResourceTypeMismatch {
                expected: self.resource_type,
                found: found.unwrap_or("<none>").to_string(),
            }),
        }
    }

    /// Extracts every partition's elements, checking that each one encodes.
    fn extract(&self, content: &Value) -> TerminologyResult<Extracted> {
        let mut extracted = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            let elements = partition.extract(content)?;
            for element in &elements {
                partition.prefix(element)?;
            }
            extracted.push((Arc::clone(partition), elements));
        }
        Ok(extracted)
    }

    fn encode(extracted: &Extracted, id: ResourceId) -> Result<Vec<IndexEntry>, CodecError> {
        let mut entries = Vec::new();
        for (partition, elements) in extracted {
            for element in elements {
                let (key, value) = partition.entry(element, id)?;
                entries.push(IndexEntry::new(partition.name(), key, value));
            }
        }
        Ok(entries)
    }

    fn scan_ids(
        &self,
        partition: &PartitionDefinition,
        prefix: &[u8],
    ) -> TerminologyResult<BTreeSet<ResourceId>> {
        Ok(self
            .store
            .scan_prefix(partition.name(), prefix)?
            .iter()
            .filter_map(|(key, _)| partition.resource_id(key))
            .collect())
    }

    fn compensated(
        &self,
        id: ResourceId,
        index_error: IndexError,
        compensation: Result<(), RepositoryError>,
    ) -> ConsistencyError {
        match compensation {
            Ok(()) => ConsistencyError::IndexWriteFailed {
                resource_type: self.resource_type,
                id,
                source: index_error,
            },
            Err(compensation_error) => {
                error!(
                    resource_type = %self.resource_type,
                    resource_id = %id,
                    index_error = %index_error,
                    compensation_error = %compensation_error,
                    "Compensation failed, envelope and index disagree"
                );
                ConsistencyError::CompensationFailed {
                    resource_type: self.resource_type,
                    id,
                    index_error,
                    compensation_error,
                }
            }
        }
    }
}

fn invalid_value(param: &str, value: &str, error: CodecError) -> TerminologyError {
    RequestError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
        message: error.to_string(),
    }
    .into()
}
