//! Path expressions over JSON resources.
//!
//! A [`PathExpr`] is a dotted path such as `CodeSystem.jurisdiction.coding`,
//! resolved once against the resource schema and then evaluated against any
//! number of resources. Evaluation flattens arrays at every step and yields
//! zero elements for absent paths.

use serde_json::Value;

use crate::error::{CompileError, ExtractionError};

use super::{Element, ElementType, ResourceType, schema};

/// A resolved path expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    expression: String,
    resource_type: ResourceType,
    segments: Vec<String>,
    element_type: ElementType,
}

impl PathExpr {
    /// Resolves `expression` against the schema of `resource_type`.
    ///
    /// The expression may be prefixed with the resource type name
    /// (`CodeSystem.url`) or be relative (`url`); a prefix naming another
    /// resource type is rejected.
    pub fn resolve(resource_type: ResourceType, expression: &str) -> Result<Self, CompileError> {
        let relative = match expression.split_once('.') {
            Some((root, rest)) if root.starts_with(char::is_uppercase) => {
                if root != resource_type.as_str() {
                    return Err(CompileError::WrongResourceType {
                        path: expression.to_string(),
                        expected: resource_type,
                        found: root.to_string(),
                    });
                }
                rest
            }
            _ => expression,
        };

        let element_type = schema::element_type(resource_type, relative).ok_or_else(|| {
            CompileError::UnresolvablePath {
                resource_type,
                path: expression.to_string(),
            }
        })?;

        Ok(Self {
            expression: expression.to_string(),
            resource_type,
            segments: relative.split('.').map(str::to_string).collect(),
            element_type,
        })
    }

    /// The expression as declared.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The resource type the path is rooted at.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// The declared type of the elements this path yields.
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Evaluates the path against a resource.
    pub fn evaluate(&self, resource: &Value) -> Result<Vec<Element>, ExtractionError> {
        if !resource.is_object() {
            return Err(ExtractionError::NotAnObject);
        }

        let mut leaves = Vec::new();
        collect_leaves(resource, &self.segments, &mut leaves);

        leaves
            .into_iter()
            .map(|leaf| self.element_type.from_json(leaf, &self.expression))
            .collect()
    }
}

fn collect_leaves<'a>(value: &'a Value, segments: &[String], out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_leaves(item, segments, out);
            }
        }
        Value::Null => {}
        _ => match segments.split_first() {
            None => out.push(value),
            Some((head, rest)) => {
                if let Some(child) = value.as_object().and_then(|obj| obj.get(head)) {
                    collect_leaves(child, rest, out);
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_prefixed_and_relative() {
        let prefixed = PathExpr::resolve(ResourceType::CodeSystem, "CodeSystem.url").unwrap();
        let relative = PathExpr::resolve(ResourceType::CodeSystem, "url").unwrap();
        assert_eq!(prefixed.element_type(), relative.element_type());
        assert_eq!(prefixed.element_type(), ElementType::Uri);
    }

    #[test]
    fn test_resolve_rejects_foreign_root() {
        let err = PathExpr::resolve(ResourceType::CodeSystem, "ValueSet.url").unwrap_err();
        assert!(matches!(err, CompileError::WrongResourceType { .. }));
    }

    #[test]
    fn test_resolve_rejects_unknown_path() {
        let err = PathExpr::resolve(ResourceType::CodeSystem, "CodeSystem.nope").unwrap_err();
        assert!(matches!(err, CompileError::UnresolvablePath { .. }));
    }

    #[test]
    fn test_evaluate_flattens_arrays() {
        let path = PathExpr::resolve(ResourceType::ValueSet, "ValueSet.jurisdiction.coding")
            .unwrap();
        let vs = json!({
            "resourceType": "ValueSet",
            "jurisdiction": [
                {"coding": [{"system": "urn:iso:std:iso:3166", "code": "US"}]},
                {"coding": [
                    {"system": "urn:iso:std:iso:3166", "code": "CA"},
                    {"system": "urn:iso:std:iso:3166", "code": "MX"}
                ]}
            ]
        });

        let values = path.evaluate(&vs).unwrap();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_evaluate_missing_path_is_empty() {
        let path = PathExpr::resolve(ResourceType::CodeSystem, "CodeSystem.count").unwrap();
        let values = path.evaluate(&json!({"resourceType": "CodeSystem"})).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_evaluate_wrong_shape_fails() {
        let path = PathExpr::resolve(ResourceType::CodeSystem, "CodeSystem.count").unwrap();
        let err = path
            .evaluate(&json!({"resourceType": "CodeSystem", "count": "many"}))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ConversionFailed { .. }));
    }
}
