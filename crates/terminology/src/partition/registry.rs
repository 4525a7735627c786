//! Partition registry.
//!
//! The registry holds every compiled [`PartitionDefinition`], indexed by
//! partition name, by `(resource_type, param)` and by operation kind. It is
//! built once by the compiler and shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CompileError;
use crate::model::ResourceType;

use super::definition::PartitionDefinition;
use super::types::{OperationKind, PartitionKind};

/// In-memory registry of compiled partitions.
#[derive(Default)]
pub struct PartitionRegistry {
    /// Partitions in declaration order.
    partitions: Vec<Arc<PartitionDefinition>>,

    /// Partitions indexed by name.
    by_name: HashMap<String, Arc<PartitionDefinition>>,

    /// Search partitions indexed by (resource_type, param).
    by_param: HashMap<ResourceType, HashMap<String, Arc<PartitionDefinition>>>,

    /// Operation partitions.
    by_operation: HashMap<OperationKind, Arc<PartitionDefinition>>,

    /// Table name -> owning partition name.
    tables: HashMap<String, String>,
}

impl PartitionRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Registers a partition, rejecting duplicate names and tables.
    pub fn register(&mut self, partition: PartitionDefinition) -> Result<(), CompileError> {
        if self.by_name.contains_key(partition.name()) {
            return Err(CompileError::DuplicatePartition {
                name: partition.name().to_string(),
            });
        }
        if let Some(first) = self.tables.get(partition.table()) {
            return Err(CompileError::DuplicateTable {
                first: first.clone(),
                second: partition.name().to_string(),
                table: partition.table().to_string(),
            });
        }

        let partition = Arc::new(partition);

        self.tables
            .insert(partition.table().to_string(), partition.name().to_string());
        self.by_name
            .insert(partition.name().to_string(), Arc::clone(&partition));

        match partition.kind() {
            PartitionKind::Search { param, .. } => {
                self.by_param
                    .entry(partition.resource_type())
                    .or_default()
                    .insert(param.clone(), Arc::clone(&partition));
            }
            PartitionKind::Operation(op) => {
                self.by_operation.insert(*op, Arc::clone(&partition));
            }
        }

        self.partitions.push(partition);
        Ok(())
    }

    /// Gets a partition by name.
    pub fn get(&self, name: &str) -> Option<Arc<PartitionDefinition>> {
        self.by_name.get(name).cloned()
    }

    /// Gets the search partition of a parameter.
    pub fn search_partition(
        &self,
        resource_type: ResourceType,
        param: &str,
    ) -> Option<Arc<PartitionDefinition>> {
        self.by_param
            .get(&resource_type)
            .and_then(|params| params.get(param))
            .cloned()
    }

    /// Gets the partition backing an operation.
    pub fn operation(&self, kind: OperationKind) -> Option<Arc<PartitionDefinition>> {
        self.by_operation.get(&kind).cloned()
    }

    /// Every partition that indexes `resource_type`, in declaration order.
    pub fn partitions_for(&self, resource_type: ResourceType) -> Vec<Arc<PartitionDefinition>> {
        self.partitions
            .iter()
            .filter(|p| p.resource_type() == resource_type)
            .cloned()
            .collect()
    }

    /// Search parameter codes registered for `resource_type`, sorted.
    pub fn params_for(&self, resource_type: ResourceType) -> Vec<String> {
        let mut params: Vec<String> = self
            .by_param
            .get(&resource_type)
            .map(|params| params.keys().cloned().collect())
            .unwrap_or_default();
        params.sort();
        params
    }

    /// Iterates every partition in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PartitionDefinition>> {
        self.partitions.iter()
    }
}

impl std::fmt::Debug for PartitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRegistry")
            .field("partitions_count", &self.partitions.len())
            .field("operations", &self.by_operation.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyCodec;
    use crate::model::PathExpr;
    use crate::partition::definition::ElementExtractor;
    use crate::partition::types::SearchParamType;

    fn search(name: &str, rt: ResourceType, param: &str, path: &str) -> PartitionDefinition {
        PartitionDefinition::new(
            name.to_string(),
            rt,
            PartitionKind::Search {
                param: param.to_string(),
                param_type: SearchParamType::Uri,
            },
            ElementExtractor::Path(PathExpr::resolve(rt, path).unwrap()),
            KeyCodec::UriHash,
            None,
        )
    }

    #[test]
    fn test_registry_lookups() {
        let mut registry = PartitionRegistry::new();
        registry
            .register(search("CodeSystem.url", ResourceType::CodeSystem, "url", "url"))
            .unwrap();
        registry
            .register(search("ValueSet.url", ResourceType::ValueSet, "url", "url"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("CodeSystem.url").is_some());
        assert_eq!(
            registry
                .search_partition(ResourceType::ValueSet, "url")
                .unwrap()
                .name(),
            "ValueSet.url"
        );
        assert!(registry.search_partition(ResourceType::ValueSet, "name").is_none());
        assert_eq!(registry.partitions_for(ResourceType::CodeSystem).len(), 1);
        assert_eq!(registry.params_for(ResourceType::CodeSystem), vec!["url"]);
        assert!(registry.operation(OperationKind::Lookup).is_none());
    }

    #[test]
    fn test_duplicate_name_error() {
        let mut registry = PartitionRegistry::new();
        registry
            .register(search("CodeSystem.url", ResourceType::CodeSystem, "url", "url"))
            .unwrap();
        let result =
            registry.register(search("CodeSystem.url", ResourceType::CodeSystem, "system", "url"));
        assert!(matches!(result, Err(CompileError::DuplicatePartition { .. })));
    }

    #[test]
    fn test_duplicate_table_error() {
        let mut registry = PartitionRegistry::new();
        registry
            .register(search("CodeSystem.a-b", ResourceType::CodeSystem, "a-b", "url"))
            .unwrap();
        let result =
            registry.register(search("CodeSystem.a_b", ResourceType::CodeSystem, "a_b", "url"));
        assert!(matches!(
            result,
            Err(CompileError::DuplicateTable { ref table, .. }) if table == "ix_codesystem_a_b"
        ));
    }
}
