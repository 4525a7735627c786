//! Key codecs.
//!
//! A [`KeyCodec`] maps a typed [`Element`] plus a [`ResourceId`] disambiguator
//! to a fixed-length key. Every codec guarantees:
//!
//! - `encode_prefix(e).len() == prefix_len()`
//! - `encode_key(e, id).len() == key_len()`
//! - `encode_key(e, id)` starts with `encode_prefix(e)`
//!
//! so a prefix scan over `encode_prefix(e)` returns exactly the keys derived
//! from elements equal to `e` (modulo hash collisions, which callers resolve
//! by re-checking the resolved resource).
//!
//! # Layouts
//!
//! ```text
//! Number          [i32 sortable]                              [id]
//! Date            [i64 millis sortable]                       [id]
//! StringHash      [h(normalized)]                             [id]
//! UriHash         [h(uri)]                                    [id]
//! TokenString     [h(value)]                                  [id]
//! TokenCode       [ordinal u32]                               [id]
//! TokenIdentifier [h(system)][h(value)]                       [id]
//! TokenCoding     [h(system)][h(code)]         [h(display)]   [id]
//! Lookup          [h(system)][h(code)]         [h(version)]   [id]
//! ValidateCode    [h(vs url)][h(system)][h(code)][h(sys ver)] [id]
//! Expansion       [h(vs url)]                  [h(vs ver)]    [id][ordinal]
//! ```
//!
//! Operation keys always order hashed scope fields first, then the hashed
//! version, then the raw id, then any raw ordinal. Appending the version hash
//! to a prefix narrows a scan to one version.

pub mod primitives;
pub mod value;

use crate::error::CodecError;
use crate::model::element::normalize_string;
use crate::model::{Element, ResourceId};

use primitives::{hash32, hash32_opt, sortable_i32, sortable_i64};

pub use value::{ConceptId, IndexValue, MemberValue, ValueCodec};

/// Key codec family, one variant per parameter-type/target-type pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCodec {
    /// `number` parameters over integers.
    Number,
    /// `date` parameters over date/dateTime.
    Date,
    /// `string` parameters; values are normalized before hashing.
    StringHash,
    /// `uri` and `reference` parameters.
    UriHash,
    /// `token` parameters over plain strings or codes.
    TokenString,
    /// `token` parameters over enumerated codes.
    TokenCode,
    /// `token` parameters over identifiers.
    TokenIdentifier,
    /// `token` parameters over codings.
    TokenCoding,
    /// CodeSystem `$lookup` operation partition.
    Lookup,
    /// ValueSet `$validate-code` operation partition.
    ValidateCode,
    /// ValueSet `$expand` operation partition.
    Expansion,
}

impl KeyCodec {
    /// Codec name used in errors and in the persisted layout catalog.
    pub fn name(&self) -> &'static str {
        match self {
            KeyCodec::Number => "number",
            KeyCodec::Date => "date",
            KeyCodec::StringHash => "string-hash",
            KeyCodec::UriHash => "uri-hash",
            KeyCodec::TokenString => "token-string",
            KeyCodec::TokenCode => "token-code",
            KeyCodec::TokenIdentifier => "token-identifier",
            KeyCodec::TokenCoding => "token-coding",
            KeyCodec::Lookup => "lookup",
            KeyCodec::ValidateCode => "validate-code",
            KeyCodec::Expansion => "expansion",
        }
    }

    /// Length of the prefix produced for one element.
    pub fn prefix_len(&self) -> usize {
        match self {
            KeyCodec::Number
            | KeyCodec::StringHash
            | KeyCodec::UriHash
            | KeyCodec::TokenString
            | KeyCodec::TokenCode
            | KeyCodec::Expansion => 4,
            KeyCodec::Date
            | KeyCodec::TokenIdentifier
            | KeyCodec::TokenCoding
            | KeyCodec::Lookup => 8,
            KeyCodec::ValidateCode => 12,
        }
    }

    /// Length of a full key.
    pub fn key_len(&self) -> usize {
        match self {
            KeyCodec::TokenCoding | KeyCodec::Lookup | KeyCodec::ValidateCode => {
                self.prefix_len() + 4 + ResourceId::WIDTH
            }
            KeyCodec::Expansion => self.prefix_len() + 4 + ResourceId::WIDTH + 4,
            _ => self.prefix_len() + ResourceId::WIDTH,
        }
    }

    /// Offset of the resource id inside a full key.
    pub fn id_offset(&self) -> usize {
        match self {
            KeyCodec::Expansion => self.key_len() - 4 - ResourceId::WIDTH,
            _ => self.key_len() - ResourceId::WIDTH,
        }
    }

    /// Reads the resource id back out of a full key.
    pub fn resource_id(&self, key: &[u8]) -> Option<ResourceId> {
        if key.len() != self.key_len() {
            return None;
        }
        let offset = self.id_offset();
        ResourceId::from_bytes(&key[offset..offset + ResourceId::WIDTH])
    }

    /// Encodes the prefix of an element.
    pub fn encode_prefix(&self, element: &Element) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.key_len());
        self.write_prefix(element, &mut out)?;
        debug_assert_eq!(out.len(), self.prefix_len());
        Ok(out)
    }

    /// Encodes the full key of an element for one resource.
    pub fn encode_key(&self, element: &Element, id: ResourceId) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.key_len());
        self.write_prefix(element, &mut out)?;

        match (self, element) {
            (KeyCodec::TokenCoding, Element::Coding { display, .. }) => {
                out.extend_from_slice(&hash32_opt(display.as_deref()));
            }
            (KeyCodec::Lookup, Element::Concept(c)) => {
                out.extend_from_slice(&hash32_opt(c.version.as_deref()));
            }
            (KeyCodec::ValidateCode, Element::Member(m)) => {
                out.extend_from_slice(&hash32_opt(m.system_version.as_deref()));
            }
            (KeyCodec::Expansion, Element::Member(m)) => {
                out.extend_from_slice(&hash32_opt(m.value_set_version.as_deref()));
            }
            _ => {}
        }

        out.extend_from_slice(&id.to_bytes());

        if let (KeyCodec::Expansion, Element::Member(m)) = (self, element) {
            out.extend_from_slice(&m.ordinal.to_be_bytes());
        }

        debug_assert_eq!(out.len(), self.key_len());
        Ok(out)
    }

    fn write_prefix(&self, element: &Element, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match (self, element) {
            (KeyCodec::Number, Element::Integer(v)) => {
                let narrowed = i32::try_from(*v).map_err(|_| CodecError::OutOfRange {
                    codec: self.name(),
                    value: *v,
                })?;
                out.extend_from_slice(&sortable_i32(narrowed));
            }
            (KeyCodec::Date, Element::DateTime(dt)) => {
                out.extend_from_slice(&sortable_i64(dt.timestamp_millis()));
            }
            (KeyCodec::StringHash, Element::String(s)) => {
                out.extend_from_slice(&hash32(&normalize_string(s)));
            }
            (KeyCodec::UriHash, Element::Uri(s) | Element::Reference(s)) => {
                out.extend_from_slice(&hash32(s));
            }
            (KeyCodec::TokenString, Element::String(s) | Element::Code { value: s, .. }) => {
                out.extend_from_slice(&hash32(s));
            }
            (KeyCodec::TokenCode, Element::Code { ordinal, .. }) => {
                out.extend_from_slice(&ordinal.to_be_bytes());
            }
            (KeyCodec::TokenIdentifier, Element::Identifier { system, value }) => {
                out.extend_from_slice(&hash32_opt(system.as_deref()));
                out.extend_from_slice(&hash32(value));
            }
            (KeyCodec::TokenCoding, Element::Coding { system, code, .. }) => {
                out.extend_from_slice(&hash32_opt(system.as_deref()));
                out.extend_from_slice(&hash32(code));
            }
            (KeyCodec::Lookup, Element::Concept(c)) => {
                out.extend_from_slice(&lookup_prefix(&c.system, &c.code, None));
            }
            (KeyCodec::ValidateCode, Element::Member(m)) => {
                out.extend_from_slice(&validate_code_prefix(
                    &m.value_set,
                    &m.system,
                    &m.code,
                    None,
                ));
            }
            (KeyCodec::Expansion, Element::Member(m)) => {
                out.extend_from_slice(&expansion_prefix(&m.value_set, None));
            }
            _ => {
                return Err(CodecError::TypeMismatch {
                    codec: self.name(),
                    element: element.kind(),
                });
            }
        }
        Ok(())
    }
}

/// Lookup scan prefix: `[h(system)][h(code)]`, plus `[h(version)]` when a
/// version is requested.
pub fn lookup_prefix(system: &str, code: &str, version: Option<&str>) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&hash32(system));
    out.extend_from_slice(&hash32(code));
    if let Some(version) = version {
        out.extend_from_slice(&hash32(version));
    }
    out
}

/// Validate-code scan prefix: `[h(vs url)][h(system)][h(code)]`, plus
/// `[h(system version)]` when a system version is requested.
pub fn validate_code_prefix(
    value_set: &str,
    system: &str,
    code: &str,
    system_version: Option<&str>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&hash32(value_set));
    out.extend_from_slice(&hash32(system));
    out.extend_from_slice(&hash32(code));
    if let Some(version) = system_version {
        out.extend_from_slice(&hash32(version));
    }
    out
}

/// Expansion scan prefix: `[h(vs url)]`, plus `[h(vs version)]` when a
/// version is requested.
pub fn expansion_prefix(value_set: &str, version: Option<&str>) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&hash32(value_set));
    if let Some(version) = version {
        out.extend_from_slice(&hash32(version));
    }
    out
}
