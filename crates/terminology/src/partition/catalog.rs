//! Built-in CodeSystem and ValueSet parameter declarations.
//!
//! These mirror the FHIR R4 search parameters defined on the two terminology
//! resources, restricted to the parameter types the index can encode.
//!
//! Search paths are plain element paths, so `CodeSystem` `code` matches
//! top-level `concept.code` entries only and ValueSet `expansion-code` only
//! the outermost `expansion.contains` entries. The operation partitions
//! flatten the full hierarchies.

use crate::model::ResourceType;

use super::compiler::{OperationDecl, ResourceDescriptor};
use super::types::OperationKind;

/// Search parameters shared by both terminology resources.
fn common(descriptor: ResourceDescriptor) -> ResourceDescriptor {
    let rt = descriptor.resource_type;
    descriptor
        .param("url", "uri", "uri", format!("{rt}.url"))
        .param("version", "token", "string", format!("{rt}.version"))
        .param("name", "string", "string", format!("{rt}.name"))
        .param("title", "string", "string", format!("{rt}.title"))
        .param("status", "token", "code", format!("{rt}.status"))
        .param("date", "date", "dateTime", format!("{rt}.date"))
        .param("identifier", "token", "Identifier", format!("{rt}.identifier"))
        .param("publisher", "string", "string", format!("{rt}.publisher"))
        .param("description", "string", "string", format!("{rt}.description"))
        .param(
            "jurisdiction",
            "token",
            "Coding",
            format!("{rt}.jurisdiction.coding"),
        )
}

/// The built-in resource descriptors.
pub fn standard_descriptors() -> Vec<ResourceDescriptor> {
    let mut descriptors = Vec::new();

    // CodeSystem search parameters
    descriptors.push(
        common(ResourceDescriptor::new(ResourceType::CodeSystem))
            .param("system", "uri", "uri", "CodeSystem.url")
            .param("count", "number", "integer", "CodeSystem.count")
            .param("content-mode", "token", "code", "CodeSystem.content")
            .param("supplements", "reference", "canonical", "CodeSystem.supplements")
            // top-level concepts only; `$lookup` walks nested ones
            .param("code", "token", "string", "CodeSystem.concept.code"),
    );

    // ValueSet search parameters
    descriptors.push(
        common(ResourceDescriptor::new(ResourceType::ValueSet))
            .param("reference", "uri", "uri", "ValueSet.compose.include.system")
            .param("code", "token", "string", "ValueSet.compose.include.concept.code")
            .param("expansion-code", "token", "string", "ValueSet.expansion.contains.code"),
    );

    descriptors
}

/// The built-in operation partitions.
pub fn standard_operations() -> Vec<OperationDecl> {
    OperationKind::ALL
        .into_iter()
        .map(OperationDecl::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_descriptors() {
        let descriptors = standard_descriptors();
        assert_eq!(descriptors.len(), 2);

        let code_system = &descriptors[0];
        assert_eq!(code_system.resource_type, ResourceType::CodeSystem);
        assert!(code_system.params.iter().any(|p| p.name == "content-mode"));
        assert!(code_system.params.iter().any(|p| p.name == "url"));

        let value_set = &descriptors[1];
        assert!(value_set.params.iter().any(|p| p.name == "reference"));
        assert!(value_set.params.iter().all(|p| p.name != "count"));
    }

    #[test]
    fn test_standard_operations() {
        let ops = standard_operations();
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| op.resource_type == op.operation.resource_type()));
    }
}
