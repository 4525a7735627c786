//! Partition compiler.
//!
//! Turns static per-resource-type parameter declarations plus the declared
//! operation partitions into a [`PartitionRegistry`]. Each search parameter's
//! path is resolved against the resource schema and its `(type, target)` pair
//! mapped to exactly one [`KeyCodec`]. Any failure aborts compilation: a
//! server must never start with a partially compiled index.
//!
//! # Example
//!
//! ```
//! use helios_terminology::partition::{PartitionCompiler, ResourceDescriptor};
//! use helios_terminology::model::ResourceType;
//!
//! let registry = PartitionCompiler::new()
//!     .resource(
//!         ResourceDescriptor::new(ResourceType::CodeSystem)
//!             .param("url", "uri", "uri", "CodeSystem.url"),
//!     )
//!     .compile()
//!     .unwrap();
//! assert_eq!(registry.len(), 1);
//! ```

use tracing::{debug, info};

use crate::codec::{KeyCodec, ValueCodec};
use crate::error::CompileError;
use crate::model::{ElementType, PathExpr, ResourceType};

use super::catalog;
use super::definition::{ElementExtractor, PartitionDefinition};
use super::registry::PartitionRegistry;
use super::types::{OperationKind, PartitionKind, SearchParamType, TargetType};

/// One declared search parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParamDecl {
    /// Parameter code as used in requests.
    pub name: String,
    /// Declared parameter type (`string`, `token`, ...).
    pub param_type: String,
    /// Declared target data type (`uri`, `Coding`, ...).
    pub target: String,
    /// Path expression, optionally rooted at the resource type.
    pub path: String,
}

impl SearchParamDecl {
    /// Creates a declaration.
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        target: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            target: target.into(),
            path: path.into(),
        }
    }
}

/// The search parameters of one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Resource type the parameters apply to.
    pub resource_type: ResourceType,
    /// Declared parameters.
    pub params: Vec<SearchParamDecl>,
}

impl ResourceDescriptor {
    /// Creates a descriptor with no parameters.
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            params: Vec::new(),
        }
    }

    /// Adds a parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: impl Into<String>,
        target: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.params
            .push(SearchParamDecl::new(name, param_type, target, path));
        self
    }
}

/// A declared operation partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDecl {
    /// Resource type the operation is declared on.
    pub resource_type: ResourceType,
    /// The operation.
    pub operation: OperationKind,
}

impl OperationDecl {
    /// Declares `operation` on its natural resource type.
    pub fn new(operation: OperationKind) -> Self {
        Self {
            resource_type: operation.resource_type(),
            operation,
        }
    }
}

/// Builder compiling declarations into a [`PartitionRegistry`].
#[derive(Debug, Clone, Default)]
pub struct PartitionCompiler {
    resources: Vec<ResourceDescriptor>,
    operations: Vec<OperationDecl>,
}

impl PartitionCompiler {
    /// Creates an empty compiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compiler loaded with the built-in CodeSystem and ValueSet
    /// parameters and the three operation partitions.
    pub fn standard() -> Self {
        let mut compiler = Self::new();
        for descriptor in catalog::standard_descriptors() {
            compiler = compiler.resource(descriptor);
        }
        for operation in catalog::standard_operations() {
            compiler = compiler.operation(operation);
        }
        compiler
    }

    /// Adds a resource descriptor.
    pub fn resource(mut self, descriptor: ResourceDescriptor) -> Self {
        self.resources.push(descriptor);
        self
    }

    /// Adds an operation partition.
    pub fn operation(mut self, decl: OperationDecl) -> Self {
        self.operations.push(decl);
        self
    }

    /// Compiles every declaration.
    pub fn compile(self) -> Result<PartitionRegistry, CompileError> {
        let mut registry = PartitionRegistry::new();

        for descriptor in &self.resources {
            for decl in &descriptor.params {
                let partition = compile_search(descriptor.resource_type, decl)?;
                debug!(
                    partition = partition.name(),
                    codec = partition.codec().name(),
                    prefix_len = partition.prefix_len(),
                    key_len = partition.key_len(),
                    "Compiled search partition"
                );
                registry.register(partition)?;
            }
        }

        for decl in &self.operations {
            let partition = compile_operation(decl)?;
            debug!(
                partition = partition.name(),
                codec = partition.codec().name(),
                "Compiled operation partition"
            );
            registry.register(partition)?;
        }

        info!(partitions = registry.len(), "Compiled index partitions");
        Ok(registry)
    }
}

fn compile_search(
    resource_type: ResourceType,
    decl: &SearchParamDecl,
) -> Result<PartitionDefinition, CompileError> {
    let unknown_type = || CompileError::UnknownParameterType {
        resource_type,
        param: decl.name.clone(),
        param_type: decl.param_type.clone(),
    };

    let param_type: SearchParamType = decl.param_type.parse().map_err(|_| unknown_type())?;
    if !param_type.is_indexable() {
        return Err(unknown_type());
    }

    let path = PathExpr::resolve(resource_type, &decl.path)?;
    let element_type = path.element_type();

    let unmappable = || CompileError::UnmappableTarget {
        resource_type,
        param: decl.name.clone(),
        param_type: decl.param_type.clone(),
        target: decl.target.clone(),
        element_type: element_type.name().to_string(),
    };

    let target: TargetType = decl.target.parse().map_err(|_| unmappable())?;
    if !target.accepts(element_type) {
        return Err(unmappable());
    }
    let codec = key_codec(param_type, element_type).ok_or_else(unmappable)?;

    Ok(PartitionDefinition::new(
        format!("{}.{}", resource_type, decl.name),
        resource_type,
        PartitionKind::Search {
            param: decl.name.clone(),
            param_type,
        },
        ElementExtractor::Path(path),
        codec,
        None,
    ))
}

fn compile_operation(decl: &OperationDecl) -> Result<PartitionDefinition, CompileError> {
    let expected = decl.operation.resource_type();
    if decl.resource_type != expected {
        return Err(CompileError::WrongResourceType {
            path: format!("{}/{}", decl.resource_type, decl.operation),
            expected,
            found: decl.resource_type.to_string(),
        });
    }

    let (extractor, codec, value_codec) = match decl.operation {
        OperationKind::Lookup => (
            ElementExtractor::Concepts,
            KeyCodec::Lookup,
            ValueCodec::ConceptId,
        ),
        OperationKind::ValidateCode => (
            ElementExtractor::Members,
            KeyCodec::ValidateCode,
            ValueCodec::Member,
        ),
        OperationKind::Expand => (
            ElementExtractor::Members,
            KeyCodec::Expansion,
            ValueCodec::Member,
        ),
    };

    Ok(PartitionDefinition::new(
        format!("{}.{}", expected, decl.operation),
        expected,
        PartitionKind::Operation(decl.operation),
        extractor,
        codec,
        Some(value_codec),
    ))
}

/// Maps a parameter type and the element type its path yields to a codec.
fn key_codec(param_type: SearchParamType, element_type: ElementType) -> Option<KeyCodec> {
    match (param_type, element_type) {
        (SearchParamType::Number, ElementType::Integer) => Some(KeyCodec::Number),
        (SearchParamType::Date, ElementType::DateTime) => Some(KeyCodec::Date),
        (SearchParamType::String, ElementType::String) => Some(KeyCodec::StringHash),
        (SearchParamType::Uri, ElementType::Uri | ElementType::Canonical) => {
            Some(KeyCodec::UriHash)
        }
        (SearchParamType::Reference, ElementType::Canonical | ElementType::Uri) => {
            Some(KeyCodec::UriHash)
        }
        (SearchParamType::Token, ElementType::String) => Some(KeyCodec::TokenString),
        (SearchParamType::Token, ElementType::Code(_)) => Some(KeyCodec::TokenCode),
        (SearchParamType::Token, ElementType::Identifier) => Some(KeyCodec::TokenIdentifier),
        (SearchParamType::Token, ElementType::Coding) => Some(KeyCodec::TokenCoding),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_one(
        param_type: &str,
        target: &str,
        path: &str,
    ) -> Result<PartitionRegistry, CompileError> {
        PartitionCompiler::new()
            .resource(ResourceDescriptor::new(ResourceType::CodeSystem).param(
                "p",
                param_type,
                target,
                path,
            ))
            .compile()
    }

    #[test]
    fn test_standard_catalog_compiles() {
        let registry = PartitionCompiler::standard().compile().unwrap();
        for op in OperationKind::ALL {
            assert!(registry.operation(op).is_some(), "missing {}", op);
        }
        let url = registry
            .search_partition(ResourceType::CodeSystem, "url")
            .unwrap();
        assert_eq!(url.codec(), KeyCodec::UriHash);
        assert_eq!(url.prefix_len(), 4);

        let jurisdiction = registry
            .search_partition(ResourceType::ValueSet, "jurisdiction")
            .unwrap();
        assert_eq!(jurisdiction.codec(), KeyCodec::TokenCoding);
        assert_eq!(jurisdiction.prefix_len(), 8);
    }

    #[test]
    fn test_codec_selection() {
        let cases = [
            ("number", "integer", "count", KeyCodec::Number),
            ("date", "dateTime", "date", KeyCodec::Date),
            ("string", "string", "name", KeyCodec::StringHash),
            ("token", "string", "version", KeyCodec::TokenString),
            ("token", "code", "status", KeyCodec::TokenCode),
            ("token", "Identifier", "identifier", KeyCodec::TokenIdentifier),
            ("reference", "canonical", "supplements", KeyCodec::UriHash),
        ];
        for (param_type, target, path, codec) in cases {
            let registry = compile_one(param_type, target, path).unwrap();
            assert_eq!(registry.get("CodeSystem.p").unwrap().codec(), codec, "{}", path);
        }
    }

    #[test]
    fn test_unknown_parameter_type_is_fatal() {
        for param_type in ["quantity", "composite", "special", "bogus"] {
            let err = compile_one(param_type, "string", "name").unwrap_err();
            assert!(
                matches!(err, CompileError::UnknownParameterType { .. }),
                "{}",
                param_type
            );
        }
    }

    #[test]
    fn test_unresolvable_path_is_fatal() {
        let err = compile_one("string", "string", "CodeSystem.nowhere").unwrap_err();
        assert!(matches!(err, CompileError::UnresolvablePath { .. }));
    }

    #[test]
    fn test_unmappable_target_is_fatal() {
        // target disagrees with the schema
        let err = compile_one("string", "Coding", "name").unwrap_err();
        assert!(matches!(err, CompileError::UnmappableTarget { .. }));

        // no codec for a number parameter over a string
        let err = compile_one("number", "string", "name").unwrap_err();
        assert!(matches!(err, CompileError::UnmappableTarget { .. }));
    }

    #[test]
    fn test_foreign_root_is_fatal() {
        let err = compile_one("uri", "uri", "ValueSet.url").unwrap_err();
        assert!(matches!(err, CompileError::WrongResourceType { .. }));
    }

    #[test]
    fn test_misplaced_operation_is_fatal() {
        let err = PartitionCompiler::new()
            .operation(OperationDecl {
                resource_type: ResourceType::ValueSet,
                operation: OperationKind::Lookup,
            })
            .compile()
            .unwrap_err();
        assert!(matches!(err, CompileError::WrongResourceType { .. }));
    }

    #[test]
    fn test_duplicate_parameter_is_fatal() {
        let err = PartitionCompiler::new()
            .resource(
                ResourceDescriptor::new(ResourceType::CodeSystem)
                    .param("url", "uri", "uri", "url")
                    .param("url", "uri", "uri", "url"),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, CompileError::DuplicatePartition { .. }));
    }
}
