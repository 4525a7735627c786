//! Value codecs for operation partitions.
//!
//! Search partitions store no value: key existence is the signal. Operation
//! partitions store a precomputed answer next to each key so the service can
//! respond from the index alone and only touch the repository to confirm.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::model::{Element, ResourceId};

/// Internal concept id: the owning CodeSystem plus the concept ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConceptId {
    resource_id: ResourceId,
    ordinal: u32,
}

impl ConceptId {
    /// Encoded width.
    pub const WIDTH: usize = 8;

    /// Creates a concept id.
    pub fn new(resource_id: ResourceId, ordinal: u32) -> Self {
        Self {
            resource_id,
            ordinal,
        }
    }

    /// The CodeSystem holding the concept.
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Depth-first position of the concept in its CodeSystem.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Packs the id into a single integer (`resource_id << 32 | ordinal`).
    pub fn as_u64(&self) -> u64 {
        (u64::from(self.resource_id.get()) << 32) | u64::from(self.ordinal)
    }

    fn to_bytes(self) -> [u8; 8] {
        self.as_u64().to_be_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| CodecError::MalformedValue {
            codec: "concept-id",
            message: format!("expected {} bytes, got {}", Self::WIDTH, bytes.len()),
        })?;
        let packed = u64::from_be_bytes(raw);
        Ok(Self::new(
            ResourceId::new((packed >> 32) as u32),
            packed as u32,
        ))
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

/// Value set member as stored in the validate-code and expansion partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberValue {
    /// Code system url.
    pub system: String,
    /// Code system version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Code.
    pub code: String,
    /// Display text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A decoded operation partition value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    /// Lookup partition value.
    Concept(ConceptId),
    /// Validate-code and expansion partition value.
    Member(MemberValue),
}

/// Value codec of an operation partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodec {
    /// 8-byte big-endian [`ConceptId`].
    ConceptId,
    /// JSON-encoded [`MemberValue`].
    Member,
}

impl ValueCodec {
    /// Codec name used in errors.
    pub fn name(&self) -> &'static str {
        match self {
            ValueCodec::ConceptId => "concept-id",
            ValueCodec::Member => "member",
        }
    }

    /// Derives the value stored alongside the key of `element`.
    pub fn value_for(&self, element: &Element, id: ResourceId) -> Result<IndexValue, CodecError> {
        match (self, element) {
            (ValueCodec::ConceptId, Element::Concept(c)) => {
                Ok(IndexValue::Concept(ConceptId::new(id, c.ordinal)))
            }
            (ValueCodec::Member, Element::Member(m)) => Ok(IndexValue::Member(MemberValue {
                system: m.system.clone(),
                version: m.system_version.clone(),
                code: m.code.clone(),
                display: m.display.clone(),
            })),
            _ => Err(CodecError::TypeMismatch {
                codec: self.name(),
                element: element.kind(),
            }),
        }
    }

    /// Encodes a value.
    pub fn encode(&self, value: &IndexValue) -> Result<Vec<u8>, CodecError> {
        match (self, value) {
            (ValueCodec::ConceptId, IndexValue::Concept(id)) => Ok(id.to_bytes().to_vec()),
            (ValueCodec::Member, IndexValue::Member(member)) => {
                serde_json::to_vec(member).map_err(|e| CodecError::MalformedValue {
                    codec: self.name(),
                    message: e.to_string(),
                })
            }
            (_, IndexValue::Concept(_)) => Err(CodecError::TypeMismatch {
                codec: self.name(),
                element: "concept",
            }),
            (_, IndexValue::Member(_)) => Err(CodecError::TypeMismatch {
                codec: self.name(),
                element: "member",
            }),
        }
    }

    /// Decodes a stored value.
    pub fn decode(&self, bytes: &[u8]) -> Result<IndexValue, CodecError> {
        match self {
            ValueCodec::ConceptId => ConceptId::from_bytes(bytes).map(IndexValue::Concept),
            ValueCodec::Member => serde_json::from_slice(bytes)
                .map(IndexValue::Member)
                .map_err(|e| CodecError::MalformedValue {
                    codec: self.name(),
                    message: e.to_string(),
                }),
        }
    }
}
