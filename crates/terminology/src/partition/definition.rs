//! Compiled partition definitions.

use serde_json::Value;

use crate::codec::{IndexValue, KeyCodec, ValueCodec};
use crate::error::{CodecError, ExtractionError};
use crate::model::{Element, ElementType, PathExpr, ResourceId, ResourceType};
use crate::model::terminology;

use super::types::{OperationKind, PartitionKind};

/// How a partition derives elements from a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementExtractor {
    /// Evaluate a resolved path.
    Path(PathExpr),
    /// Flatten CodeSystem concepts.
    Concepts,
    /// Flatten ValueSet members.
    Members,
}

impl ElementExtractor {
    /// Extracts every indexable element of `resource`.
    pub fn extract(&self, resource: &Value) -> Result<Vec<Element>, ExtractionError> {
        if !resource.is_object() {
            return Err(ExtractionError::NotAnObject);
        }
        match self {
            ElementExtractor::Path(path) => path.evaluate(resource),
            ElementExtractor::Concepts => terminology::concept_elements(resource),
            ElementExtractor::Members => terminology::member_elements(resource),
        }
    }
}

/// A named logical index.
///
/// Built once by the compiler and shared immutably. The key codec guarantees
/// that `key(e, id)` starts with `prefix(e)` and that both have the fixed
/// lengths reported by [`prefix_len`](Self::prefix_len) and
/// [`key_len`](Self::key_len).
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDefinition {
    name: String,
    resource_type: ResourceType,
    kind: PartitionKind,
    extractor: ElementExtractor,
    codec: KeyCodec,
    value_codec: Option<ValueCodec>,
    table: String,
}

impl PartitionDefinition {
    pub(crate) fn new(
        name: String,
        resource_type: ResourceType,
        kind: PartitionKind,
        extractor: ElementExtractor,
        codec: KeyCodec,
        value_codec: Option<ValueCodec>,
    ) -> Self {
        let table = table_name(&name);
        Self {
            name,
            resource_type,
            kind,
            extractor,
            codec,
            value_codec,
            table,
        }
    }

    /// Partition name, e.g. `CodeSystem.url` or `CodeSystem.$lookup`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource type whose resources populate this partition.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Search parameter or operation.
    pub fn kind(&self) -> &PartitionKind {
        &self.kind
    }

    /// The operation this partition serves, if any.
    pub fn operation(&self) -> Option<OperationKind> {
        match self.kind {
            PartitionKind::Operation(op) => Some(op),
            PartitionKind::Search { .. } => None,
        }
    }

    /// Key codec.
    pub fn codec(&self) -> KeyCodec {
        self.codec
    }

    /// Value codec (operation partitions only).
    pub fn value_codec(&self) -> Option<ValueCodec> {
        self.value_codec
    }

    /// Backing table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Prefix length in bytes.
    pub fn prefix_len(&self) -> usize {
        self.codec.prefix_len()
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        self.codec.key_len()
    }

    /// Declared element type for path-based partitions.
    pub fn element_type(&self) -> Option<ElementType> {
        match &self.extractor {
            ElementExtractor::Path(path) => Some(path.element_type()),
            _ => None,
        }
    }

    /// Extracts every indexable element of `resource`.
    pub fn extract(&self, resource: &Value) -> Result<Vec<Element>, ExtractionError> {
        self.extractor.extract(resource)
    }

    /// Encodes the scan prefix for an element.
    pub fn prefix(&self, element: &Element) -> Result<Vec<u8>, CodecError> {
        self.codec.encode_prefix(element)
    }

    /// Encodes the key of an element for one resource.
    pub fn key(&self, element: &Element, id: ResourceId) -> Result<Vec<u8>, CodecError> {
        self.codec.encode_key(element, id)
    }

    /// Encodes the full `(key, value)` pair for an element.
    ///
    /// Search partitions store an empty value.
    pub fn entry(
        &self,
        element: &Element,
        id: ResourceId,
    ) -> Result<(Vec<u8>, Vec<u8>), CodecError> {
        let key = self.key(element, id)?;
        let value = match self.value_codec {
            Some(codec) => codec.encode(&codec.value_for(element, id)?)?,
            None => Vec::new(),
        };
        Ok((key, value))
    }

    /// Decodes a stored value. Search partitions have none.
    pub fn decode_value(&self, bytes: &[u8]) -> Result<Option<IndexValue>, CodecError> {
        self.value_codec
            .map(|codec| codec.decode(bytes))
            .transpose()
    }

    /// Reads the resource id out of a key of this partition.
    pub fn resource_id(&self, key: &[u8]) -> Option<ResourceId> {
        self.codec.resource_id(key)
    }

    /// Returns true if `resource` contains an element equal to `query`.
    ///
    /// Used to discard hash-collision candidates after a prefix scan.
    pub fn contains(&self, resource: &Value, query: &Element) -> Result<bool, ExtractionError> {
        Ok(self
            .extract(resource)?
            .iter()
            .any(|element| element.matches_query(query)))
    }
}

/// Derives the backing table of a partition: `ix_` + lower-case
/// alphanumerics, every other character replaced by `_`.
pub fn table_name(partition: &str) -> String {
    let mut table = String::with_capacity(partition.len() + 3);
    table.push_str("ix_");
    for c in partition.chars() {
        if c.is_ascii_alphanumeric() {
            table.push(c.to_ascii_lowercase());
        } else {
            table.push('_');
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::types::SearchParamType;
    use serde_json::json;

    fn url_partition() -> PartitionDefinition {
        PartitionDefinition::new(
            "CodeSystem.url".to_string(),
            ResourceType::CodeSystem,
            PartitionKind::Search {
                param: "url".to_string(),
                param_type: SearchParamType::Uri,
            },
            ElementExtractor::Path(
                PathExpr::resolve(ResourceType::CodeSystem, "CodeSystem.url").unwrap(),
            ),
            KeyCodec::UriHash,
            None,
        )
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("CodeSystem.url"), "ix_codesystem_url");
        assert_eq!(table_name("ValueSet.$validate-code"), "ix_valueset__validate_code");
        assert_eq!(table_name("CodeSystem.content-mode"), "ix_codesystem_content_mode");
    }

    #[test]
    fn test_search_entry_has_empty_value() {
        let partition = url_partition();
        let resource = json!({"resourceType": "CodeSystem", "url": "http://ex.org/cs"});
        let elements = partition.extract(&resource).unwrap();
        assert_eq!(elements.len(), 1);

        let (key, value) = partition.entry(&elements[0], ResourceId::new(3)).unwrap();
        assert_eq!(key.len(), partition.key_len());
        assert!(value.is_empty());
        assert_eq!(partition.resource_id(&key), Some(ResourceId::new(3)));
        assert_eq!(partition.decode_value(&value).unwrap(), None);
    }

    #[test]
    fn test_lookup_entry_carries_concept_id() {
        let partition = PartitionDefinition::new(
            "CodeSystem.$lookup".to_string(),
            ResourceType::CodeSystem,
            PartitionKind::Operation(OperationKind::Lookup),
            ElementExtractor::Concepts,
            KeyCodec::Lookup,
            Some(ValueCodec::ConceptId),
        );
        let resource = json!({
            "resourceType": "CodeSystem",
            "url": "http://ex.org/cs",
            "concept": [{"code": "A"}, {"code": "B"}]
        });
        let elements = partition.extract(&resource).unwrap();
        let (_, value) = partition.entry(&elements[1], ResourceId::new(5)).unwrap();
        assert_eq!(
            partition.decode_value(&value).unwrap(),
            Some(IndexValue::Concept(crate::codec::ConceptId::new(
                ResourceId::new(5),
                1
            )))
        );
    }

    #[test]
    fn test_extract_rejects_non_object() {
        assert_eq!(
            url_partition().extract(&json!([1, 2])).unwrap_err(),
            ExtractionError::NotAnObject
        );
    }
}
