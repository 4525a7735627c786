//! Concept and value set member flattening.
//!
//! The operation partitions do not index a single path; they index derived
//! records. CodeSystem concepts are flattened depth-first through nested
//! `concept` hierarchies. ValueSet members are collected from enumerated
//! `compose.include.concept` entries and from a stored `expansion.contains`
//! tree, first occurrence of each `(system, system version, code)` winning.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ExtractionError;

use super::{ConceptElement, Element, MemberElement};

fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn require_code(value: &Value, path: &str) -> Result<String, ExtractionError> {
    str_field(value, "code").ok_or_else(|| ExtractionError::MissingField {
        path: path.to_string(),
        field: "code".to_string(),
    })
}

fn array<'a>(value: &'a Value, field: &str) -> &'a [Value] {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Flattens every concept of a CodeSystem.
///
/// A CodeSystem without a `url` cannot be looked up and yields no concepts.
pub fn concepts(code_system: &Value) -> Result<Vec<ConceptElement>, ExtractionError> {
    let Some(system) = str_field(code_system, "url") else {
        return Ok(Vec::new());
    };
    let version = str_field(code_system, "version");

    let mut out = Vec::new();
    let mut stack: Vec<&Value> = array(code_system, "concept").iter().rev().collect();
    while let Some(concept) = stack.pop() {
        out.push(ConceptElement {
            system: system.clone(),
            version: version.clone(),
            code: require_code(concept, "CodeSystem.concept")?,
            display: str_field(concept, "display"),
            ordinal: out.len() as u32,
        });
        stack.extend(array(concept, "concept").iter().rev());
    }
    Ok(out)
}

/// Concept elements for the lookup partition.
pub fn concept_elements(code_system: &Value) -> Result<Vec<Element>, ExtractionError> {
    Ok(concepts(code_system)?
        .into_iter()
        .map(Element::Concept)
        .collect())
}

/// Flattens the enumerated members of a ValueSet.
///
/// Includes that name only a `valueSet` or a whole `system` without concepts
/// contribute nothing; a ValueSet without a `url` yields no members.
pub fn members(value_set: &Value) -> Result<Vec<MemberElement>, ExtractionError> {
    let Some(url) = str_field(value_set, "url") else {
        return Ok(Vec::new());
    };
    let vs_version = str_field(value_set, "version");

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |system: String, system_version: Option<String>, code: String, display| {
        if seen.insert((system.clone(), system_version.clone(), code.clone())) {
            out.push(MemberElement {
                value_set: url.clone(),
                value_set_version: vs_version.clone(),
                system,
                system_version,
                code,
                display,
                ordinal: out.len() as u32,
            });
        }
    };

    if let Some(compose) = value_set.get("compose") {
        for include in array(compose, "include") {
            let Some(system) = str_field(include, "system") else {
                continue;
            };
            let system_version = str_field(include, "version");
            for concept in array(include, "concept") {
                push(
                    system.clone(),
                    system_version.clone(),
                    require_code(concept, "ValueSet.compose.include.concept")?,
                    str_field(concept, "display"),
                );
            }
        }
    }

    if let Some(expansion) = value_set.get("expansion") {
        let mut stack: Vec<&Value> = array(expansion, "contains").iter().rev().collect();
        while let Some(entry) = stack.pop() {
            // abstract grouping entries carry no system
            if let Some(system) = str_field(entry, "system") {
                push(
                    system,
                    str_field(entry, "version"),
                    require_code(entry, "ValueSet.expansion.contains")?,
                    str_field(entry, "display"),
                );
            }
            stack.extend(array(entry, "contains").iter().rev());
        }
    }

    Ok(out)
}

/// Member elements for the validate-code and expand partitions.
pub fn member_elements(value_set: &Value) -> Result<Vec<Element>, ExtractionError> {
    Ok(members(value_set)?
        .into_iter()
        .map(Element::Member)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_concepts_flatten_depth_first() {
        let cs = json!({
            "resourceType": "CodeSystem",
            "url": "http://ex.org/cs",
            "version": "1",
            "concept": [
                {"code": "A", "display": "Alpha", "concept": [
                    {"code": "A1"},
                    {"code": "A2"}
                ]},
                {"code": "B"}
            ]
        });

        let codes: Vec<_> = concepts(&cs)
            .unwrap()
            .into_iter()
            .map(|c| (c.code, c.ordinal))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("A".to_string(), 0),
                ("A1".to_string(), 1),
                ("A2".to_string(), 2),
                ("B".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_concepts_require_url() {
        let cs = json!({"resourceType": "CodeSystem", "concept": [{"code": "A"}]});
        assert!(concepts(&cs).unwrap().is_empty());
    }

    #[test]
    fn test_concept_without_code_is_rejected() {
        let cs = json!({"url": "http://ex.org/cs", "concept": [{"display": "nameless"}]});
        assert!(matches!(
            concepts(&cs),
            Err(ExtractionError::MissingField { .. })
        ));
    }

    #[test]
    fn test_members_from_compose_and_expansion() {
        let vs = json!({
            "resourceType": "ValueSet",
            "url": "http://ex.org/vs",
            "compose": {"include": [
                {"system": "http://ex.org/cs", "version": "2", "concept": [
                    {"code": "A", "display": "Alpha"},
                    {"code": "B"}
                ]},
                {"valueSet": ["http://ex.org/other"]}
            ]},
            "expansion": {"contains": [
                {"system": "http://ex.org/cs", "code": "A"},
                {"abstract": true, "contains": [
                    {"system": "http://ex.org/cs2", "code": "Z", "display": "Zed"}
                ]}
            ]}
        });

        let members = members(&vs).unwrap();
        let codes: Vec<_> = members.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "Z"]);
        assert_eq!(members[0].system_version.as_deref(), Some("2"));
        assert_eq!(members[2].ordinal, 2);
        assert_eq!(members[2].system, "http://ex.org/cs2");
    }

    #[test]
    fn test_members_keep_each_system_version() {
        let vs = json!({
            "url": "http://ex.org/vs",
            "compose": {"include": [
                {"system": "http://ex.org/cs", "version": "1", "concept": [{"code": "A"}]},
                {"system": "http://ex.org/cs", "version": "2", "concept": [{"code": "A"}]},
                {"system": "http://ex.org/cs", "version": "2", "concept": [{"code": "A"}]}
            ]}
        });

        let versions: Vec<_> = members(&vs)
            .unwrap()
            .into_iter()
            .map(|m| m.system_version)
            .collect();
        assert_eq!(versions, vec![Some("1".to_string()), Some("2".to_string())]);
    }
}
