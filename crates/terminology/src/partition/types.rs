//! Parameter, target and operation types used by partition declarations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{ElementType, ResourceType};

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Special search parameters (_id, _lastUpdated, etc.).
    Special,
}

impl SearchParamType {
    /// Returns true if the index has a key codec for this parameter type.
    pub fn is_indexable(&self) -> bool {
        !matches!(
            self,
            SearchParamType::Quantity | SearchParamType::Composite | SearchParamType::Special
        )
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
            SearchParamType::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Declared FHIR data type a search parameter targets.
///
/// The compiler checks the target against the element type the path
/// resolves to, then picks the key codec from `(param type, target)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// `string`.
    String,
    /// `uri` or `url`.
    Uri,
    /// `canonical`.
    Canonical,
    /// `integer`.
    Integer,
    /// `date` or `dateTime`.
    DateTime,
    /// `code` bound to a required value set.
    Code,
    /// `Identifier`.
    Identifier,
    /// `Coding`.
    Coding,
}

impl TargetType {
    /// Returns true if elements of `element_type` can be indexed as this target.
    pub fn accepts(&self, element_type: ElementType) -> bool {
        matches!(
            (self, element_type),
            (TargetType::String, ElementType::String)
                | (TargetType::Uri, ElementType::Uri)
                | (TargetType::Canonical, ElementType::Canonical)
                | (TargetType::Integer, ElementType::Integer)
                | (TargetType::DateTime, ElementType::DateTime)
                | (TargetType::Code, ElementType::Code(_))
                | (TargetType::Identifier, ElementType::Identifier)
                | (TargetType::Coding, ElementType::Coding)
        )
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetType::String => "string",
            TargetType::Uri => "uri",
            TargetType::Canonical => "canonical",
            TargetType::Integer => "integer",
            TargetType::DateTime => "dateTime",
            TargetType::Code => "code",
            TargetType::Identifier => "Identifier",
            TargetType::Coding => "Coding",
        };
        f.write_str(name)
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "markdown" => Ok(TargetType::String),
            "uri" | "url" => Ok(TargetType::Uri),
            "canonical" => Ok(TargetType::Canonical),
            "integer" | "positiveInt" | "unsignedInt" => Ok(TargetType::Integer),
            "date" | "dateTime" => Ok(TargetType::DateTime),
            "code" => Ok(TargetType::Code),
            "Identifier" => Ok(TargetType::Identifier),
            "Coding" => Ok(TargetType::Coding),
            _ => Err(format!("unknown target type: {}", s)),
        }
    }
}

/// Terminology operations backed by a dedicated partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    /// `CodeSystem/$lookup`.
    Lookup,
    /// `ValueSet/$validate-code`.
    ValidateCode,
    /// `ValueSet/$expand`.
    Expand,
}

impl OperationKind {
    /// All operation partitions.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Lookup,
        OperationKind::ValidateCode,
        OperationKind::Expand,
    ];

    /// Operation name as used in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Lookup => "$lookup",
            OperationKind::ValidateCode => "$validate-code",
            OperationKind::Expand => "$expand",
        }
    }

    /// The resource type the operation indexes.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            OperationKind::Lookup => ResourceType::CodeSystem,
            OperationKind::ValidateCode | OperationKind::Expand => ResourceType::ValueSet,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a partition indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionKind {
    /// A search parameter.
    Search {
        /// Parameter code, e.g. `url`.
        param: String,
        /// Parameter type.
        param_type: SearchParamType,
    },
    /// A terminology operation.
    Operation(OperationKind),
}
