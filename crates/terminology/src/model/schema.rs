//! Static resource schemas.
//!
//! Each resource type declares the element paths the index may reference and
//! the [`ElementType`] found there. Paths are relative to the resource root and
//! flatten arrays at every step, so `concept.code` covers every top-level
//! concept.

use super::{ElementType, ResourceType};

/// `PublicationStatus` value set.
pub const PUBLICATION_STATUS: &[&str] = &["draft", "active", "retired", "unknown"];

/// `CodeSystemContentMode` value set.
pub const CONTENT_MODE: &[&str] = &["not-present", "example", "fragment", "complete", "supplement"];

const CODE_SYSTEM: &[(&str, ElementType)] = &[
    ("url", ElementType::Uri),
    ("identifier", ElementType::Identifier),
    ("version", ElementType::String),
    ("name", ElementType::String),
    ("title", ElementType::String),
    ("status", ElementType::Code(PUBLICATION_STATUS)),
    ("date", ElementType::DateTime),
    ("publisher", ElementType::String),
    ("description", ElementType::String),
    ("jurisdiction.coding", ElementType::Coding),
    ("valueSet", ElementType::Canonical),
    ("content", ElementType::Code(CONTENT_MODE)),
    ("supplements", ElementType::Canonical),
    ("count", ElementType::Integer),
    ("concept.code", ElementType::String),
    ("concept.display", ElementType::String),
];

const VALUE_SET: &[(&str, ElementType)] = &[
    ("url", ElementType::Uri),
    ("identifier", ElementType::Identifier),
    ("version", ElementType::String),
    ("name", ElementType::String),
    ("title", ElementType::String),
    ("status", ElementType::Code(PUBLICATION_STATUS)),
    ("date", ElementType::DateTime),
    ("publisher", ElementType::String),
    ("description", ElementType::String),
    ("jurisdiction.coding", ElementType::Coding),
    ("compose.include.system", ElementType::Uri),
    ("compose.include.valueSet", ElementType::Canonical),
    ("compose.include.concept.code", ElementType::String),
    ("expansion.contains.code", ElementType::String),
    ("expansion.total", ElementType::Integer),
];

/// Returns every declared path of a resource type.
pub fn paths(resource_type: ResourceType) -> &'static [(&'static str, ElementType)] {
    match resource_type {
        ResourceType::CodeSystem => CODE_SYSTEM,
        ResourceType::ValueSet => VALUE_SET,
    }
}

/// Resolves a relative path to its declared element type.
pub fn element_type(resource_type: ResourceType, path: &str) -> Option<ElementType> {
    paths(resource_type)
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, ty)| *ty)
}
