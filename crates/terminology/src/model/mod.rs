//! Resource model accessors.
//!
//! Resources are carried as `serde_json::Value`. This module provides the
//! typed view the index needs on top of them:
//!
//! - [`schema`] - static `path -> ElementType` tables per resource type
//! - [`element`] - typed [`Element`] values and their JSON/query conversions
//! - [`accessor`] - [`PathExpr`] resolution and evaluation
//! - [`terminology`] - concept and value set member flattening used by the
//!   operation partitions

pub mod accessor;
pub mod element;
pub mod schema;
pub mod terminology;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

pub use accessor::PathExpr;
pub use element::{ConceptElement, Element, ElementType, MemberElement};

/// Resource types served by the terminology index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// FHIR CodeSystem.
    CodeSystem,
    /// FHIR ValueSet.
    ValueSet,
}

impl ResourceType {
    /// All supported resource types.
    pub const ALL: [ResourceType; 2] = [ResourceType::CodeSystem, ResourceType::ValueSet];

    /// Returns the FHIR resource type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::CodeSystem => "CodeSystem",
            ResourceType::ValueSet => "ValueSet",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CodeSystem" => Ok(ResourceType::CodeSystem),
            "ValueSet" => Ok(ResourceType::ValueSet),
            _ => Err(format!("Unsupported resource type: {}", s)),
        }
    }
}

/// Internal resource id assigned by the repository.
///
/// Every index key ends its scope fields with this id, so it is limited to
/// four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u32);

impl ResourceId {
    /// Width of the id inside a key.
    pub const WIDTH: usize = 4;

    /// Creates a resource id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Big-endian key bytes.
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Reads an id from four big-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.try_into().ok()?;
        Some(Self(u32::from_be_bytes(raw)))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ResourceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl TryFrom<i64> for ResourceId {
    type Error = RepositoryError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        u32::try_from(id)
            .map(Self)
            .map_err(|_| RepositoryError::IdOverflow { id })
    }
}

impl FromStr for ResourceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(Self)
    }
}
