//! Typed element values extracted from resources.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExtractionError, RequestError};

/// Declared type of a path in a resource schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Free text.
    String,
    /// Absolute URI.
    Uri,
    /// Canonical reference to another resource (`url|version`).
    Canonical,
    /// Integer.
    Integer,
    /// date or dateTime.
    DateTime,
    /// Code bound to a fixed list of values; the index stores the ordinal.
    Code(&'static [&'static str]),
    /// Identifier (`system` + `value`).
    Identifier,
    /// Coding (`system` + `code` + `display`).
    Coding,
}

impl ElementType {
    /// Short type name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::String => "string",
            ElementType::Uri => "uri",
            ElementType::Canonical => "canonical",
            ElementType::Integer => "integer",
            ElementType::DateTime => "dateTime",
            ElementType::Code(_) => "code",
            ElementType::Identifier => "Identifier",
            ElementType::Coding => "Coding",
        }
    }

    /// Converts a JSON leaf found at `path` into an element of this type.
    pub fn from_json(&self, value: &Value, path: &str) -> Result<Element, ExtractionError> {
        let mismatch = || ExtractionError::ConversionFailed {
            path: path.to_string(),
            expected: self.name().to_string(),
            actual: value.to_string(),
        };

        match self {
            ElementType::String => value
                .as_str()
                .map(|s| Element::String(s.to_string()))
                .ok_or_else(mismatch),
            ElementType::Uri => value
                .as_str()
                .map(|s| Element::Uri(s.to_string()))
                .ok_or_else(mismatch),
            ElementType::Canonical => value
                .as_str()
                .map(|s| Element::Reference(s.to_string()))
                .ok_or_else(mismatch),
            ElementType::Integer => value.as_i64().map(Element::Integer).ok_or_else(mismatch),
            ElementType::DateTime => value
                .as_str()
                .and_then(parse_fhir_datetime)
                .map(Element::DateTime)
                .ok_or_else(mismatch),
            ElementType::Code(values) => value
                .as_str()
                .and_then(|s| code_element(values, s))
                .ok_or_else(mismatch),
            ElementType::Identifier => {
                let obj = value.as_object().ok_or_else(mismatch)?;
                let id_value = obj.get("value").and_then(Value::as_str).ok_or_else(|| {
                    ExtractionError::MissingField {
                        path: path.to_string(),
                        field: "value".to_string(),
                    }
                })?;
                Ok(Element::Identifier {
                    system: optional_str(obj.get("system")),
                    value: id_value.to_string(),
                })
            }
            ElementType::Coding => {
                let obj = value.as_object().ok_or_else(mismatch)?;
                let code = obj.get("code").and_then(Value::as_str).ok_or_else(|| {
                    ExtractionError::MissingField {
                        path: path.to_string(),
                        field: "code".to_string(),
                    }
                })?;
                Ok(Element::Coding {
                    system: optional_str(obj.get("system")),
                    code: code.to_string(),
                    display: optional_str(obj.get("display")),
                })
            }
        }
    }

    /// Parses a single search value into an element of this type.
    ///
    /// Identifiers and codings use the `system|value` token syntax; a value
    /// without a `|` has no system.
    pub fn parse_query(&self, param: &str, raw: &str) -> Result<Element, RequestError> {
        let invalid = |message: &str| RequestError::InvalidValue {
            param: param.to_string(),
            value: raw.to_string(),
            message: message.to_string(),
        };

        match self {
            ElementType::String => Ok(Element::String(raw.to_string())),
            ElementType::Uri => Ok(Element::Uri(raw.to_string())),
            ElementType::Canonical => Ok(Element::Reference(raw.to_string())),
            ElementType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Element::Integer)
                .map_err(|_| invalid("expected an integer")),
            ElementType::DateTime => parse_fhir_datetime(raw.trim())
                .map(Element::DateTime)
                .ok_or_else(|| invalid("expected a FHIR date or dateTime")),
            ElementType::Code(values) => {
                code_element(values, raw).ok_or_else(|| invalid("not a member of the code list"))
            }
            ElementType::Identifier => {
                let (system, value) = split_token(raw);
                Ok(Element::Identifier {
                    system,
                    value: value.to_string(),
                })
            }
            ElementType::Coding => {
                let (system, code) = split_token(raw);
                Ok(Element::Coding {
                    system,
                    code: code.to_string(),
                    display: None,
                })
            }
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn optional_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn code_element(values: &[&str], code: &str) -> Option<Element> {
    values
        .iter()
        .position(|v| *v == code)
        .map(|ordinal| Element::Code {
            value: code.to_string(),
            ordinal: ordinal as u32,
        })
}

fn split_token(raw: &str) -> (Option<String>, &str) {
    match raw.split_once('|') {
        Some(("", value)) => (None, value),
        Some((system, value)) => (Some(system.to_string()), value),
        None => (None, raw),
    }
}

/// Parses a FHIR `date` or `dateTime`.
///
/// Partial dates (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`) resolve to the start of the
/// period. Date-times without an offset are read as UTC.
pub fn parse_fhir_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }

    let mut parts = raw.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    if parts.next().is_some() || raw.len() < 4 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A CodeSystem concept flattened for the lookup partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptElement {
    /// CodeSystem url.
    pub system: String,
    /// CodeSystem version.
    pub version: Option<String>,
    /// Concept code.
    pub code: String,
    /// Concept display.
    pub display: Option<String>,
    /// Depth-first position of the concept inside its CodeSystem.
    pub ordinal: u32,
}

/// A ValueSet member flattened for the validate-code and expand partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberElement {
    /// ValueSet url.
    pub value_set: String,
    /// ValueSet version.
    pub value_set_version: Option<String>,
    /// Code system of the member.
    pub system: String,
    /// Code system version pinned by the include, if any.
    pub system_version: Option<String>,
    /// Member code.
    pub code: String,
    /// Member display.
    pub display: Option<String>,
    /// Position of the member inside the ValueSet.
    pub ordinal: u32,
}

/// A typed value produced by the resource accessor.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Element {
    String(String),
    Uri(String),
    Reference(String),
    Integer(i64),
    DateTime(DateTime<Utc>),
    /// Enumerated code with its position in the bound code list.
    Code {
        value: String,
        ordinal: u32,
    },
    Identifier {
        system: Option<String>,
        value: String,
    },
    Coding {
        system: Option<String>,
        code: String,
        display: Option<String>,
    },
    Concept(ConceptElement),
    Member(MemberElement),
}

impl Element {
    /// Variant name used in codec errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Element::String(_) => "string",
            Element::Uri(_) => "uri",
            Element::Reference(_) => "reference",
            Element::Integer(_) => "integer",
            Element::DateTime(_) => "dateTime",
            Element::Code { .. } => "code",
            Element::Identifier { .. } => "identifier",
            Element::Coding { .. } => "coding",
            Element::Concept(_) => "concept",
            Element::Member(_) => "member",
        }
    }

    /// Equality used to confirm a scanned candidate against a query.
    ///
    /// Codings match on system and code only, so a query without a display
    /// matches every display variant. Strings compare after normalization.
    pub fn matches_query(&self, query: &Element) -> bool {
        match (self, query) {
            (Element::String(a), Element::String(b)) => {
                normalize_string(a) == normalize_string(b)
            }
            (
                Element::Coding { system, code, .. },
                Element::Coding {
                    system: q_system,
                    code: q_code,
                    ..
                },
            ) => system == q_system && code == q_code,
            (Element::Code { value, .. }, Element::String(q)) => value == q,
            (a, b) => a == b,
        }
    }
}

/// Normalization applied to `string` search values before hashing.
pub fn normalize_string(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const STATUS: &[&str] = &["draft", "active", "retired", "unknown"];

    #[test]
    fn test_parse_partial_dates() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_fhir_datetime("2024"), Some(expected));
        assert_eq!(parse_fhir_datetime("2024-01"), Some(expected));
        assert_eq!(parse_fhir_datetime("2024-01-01"), Some(expected));
        assert_eq!(
            parse_fhir_datetime("2024-03-05T10:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap())
        );
        assert_eq!(parse_fhir_datetime("not-a-date"), None);
        assert_eq!(parse_fhir_datetime("2024-13"), None);
    }

    #[test]
    fn test_code_from_json_uses_ordinal() {
        let element = ElementType::Code(STATUS)
            .from_json(&json!("retired"), "status")
            .unwrap();
        assert_eq!(
            element,
            Element::Code {
                value: "retired".to_string(),
                ordinal: 2
            }
        );

        let err = ElementType::Code(STATUS)
            .from_json(&json!("bogus"), "status")
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ConversionFailed { .. }));
    }

    #[test]
    fn test_type_mismatch_is_loud() {
        let err = ElementType::Integer
            .from_json(&json!("twelve"), "count")
            .unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[test]
    fn test_identifier_requires_value() {
        let err = ElementType::Identifier
            .from_json(&json!({"system": "urn:ietf:rfc:3986"}), "identifier")
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField { .. }));
    }

    #[test]
    fn test_token_query_syntax() {
        let with_system = ElementType::Coding
            .parse_query("jurisdiction", "urn:iso:std:iso:3166|US")
            .unwrap();
        assert_eq!(
            with_system,
            Element::Coding {
                system: Some("urn:iso:std:iso:3166".to_string()),
                code: "US".to_string(),
                display: None
            }
        );

        let no_system = ElementType::Identifier
            .parse_query("identifier", "|abc")
            .unwrap();
        assert_eq!(
            no_system,
            Element::Identifier {
                system: None,
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_coding_match_ignores_display() {
        let stored = Element::Coding {
            system: Some("s".to_string()),
            code: "c".to_string(),
            display: Some("Shown".to_string()),
        };
        let query = ElementType::Coding.parse_query("p", "s|c").unwrap();
        assert!(stored.matches_query(&query));
    }

    #[test]
    fn test_string_match_is_normalized() {
        let stored = Element::String("Example Codes".to_string());
        assert!(stored.matches_query(&Element::String("  example codes ".to_string())));
    }
}
