//! Command execution.

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use helios_terminology::service::{ExpandRequest, LookupRequest, ValidateCodeRequest};
use helios_terminology::{ResourceEnvelope, ResourceId, ResourceType, TerminologyService};
use serde_json::{Value, json};
use tracing::info;

use crate::config::Command;

/// Runs one command and returns its JSON output.
pub fn execute(service: &TerminologyService, command: &Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Load { file } => load(service, file)?,
        Command::Read { resource_type, id } => {
            match service.read(*resource_type, ResourceId::new(*id))? {
                Some(envelope) => serde_json::to_value(envelope)?,
                None => bail!("{}/{} not found", resource_type, id),
            }
        }
        Command::Delete { resource_type, id } => {
            let deleted = service.delete(*resource_type, ResourceId::new(*id))?;
            json!({ "deleted": deleted })
        }
        Command::Search {
            resource_type,
            param,
            value,
        } => {
            let matches = service.search(*resource_type, param, value)?;
            json!({
                "total": matches.len(),
                "entries": matches.iter().map(summary).collect::<Vec<_>>(),
            })
        }
        Command::Lookup {
            system,
            code,
            version,
        } => {
            let request = LookupRequest {
                system: system.clone(),
                code: code.clone(),
                version: version.clone(),
            };
            match service.lookup(&request)? {
                Some(result) => serde_json::to_value(result)?,
                None => bail!("code {}|{} not found", system, code),
            }
        }
        Command::ValidateCode {
            url,
            system,
            code,
            system_version,
        } => serde_json::to_value(service.validate_code(&ValidateCodeRequest {
            url: url.clone(),
            system: system.clone(),
            code: code.clone(),
            system_version: system_version.clone(),
        })?)?,
        Command::Expand { url, version } => {
            let request = ExpandRequest {
                url: url.clone(),
                version: version.clone(),
            };
            match service.expand(&request)? {
                Some(expansion) => serde_json::to_value(expansion)?,
                None => bail!("value set {} not found", url),
            }
        }
        Command::Reindex => {
            let mut counts = serde_json::Map::new();
            for resource_type in ResourceType::ALL {
                let entries = service.manager(resource_type).reindex_all()?;
                counts.insert(resource_type.to_string(), json!(entries));
            }
            Value::Object(counts)
        }
        Command::Partitions => partitions(service)?,
    };
    Ok(output)
}

fn summary(envelope: &ResourceEnvelope) -> Value {
    json!({
        "resourceType": envelope.resource_type,
        "id": envelope.id,
        "versionId": envelope.version_id,
        "url": envelope.content.get("url"),
    })
}

/// Loads a single resource, or every `entry.resource` of a Bundle.
fn load(service: &TerminologyService, file: &Path) -> anyhow::Result<Value> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let resources = if document.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
        document
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("resource").cloned())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        vec![document]
    };

    let mut loaded = Vec::with_capacity(resources.len());
    for resource in resources {
        let envelope = service.create(resource)?;
        loaded.push(summary(&envelope));
    }

    info!(file = %file.display(), resources = loaded.len(), "Loaded resources");
    Ok(json!({ "loaded": loaded }))
}

fn partitions(service: &TerminologyService) -> anyhow::Result<Value> {
    let store = service.store();
    let mut out = Vec::new();
    for partition in store.registry().iter() {
        out.push(json!({
            "name": partition.name(),
            "resourceType": partition.resource_type(),
            "codec": partition.codec().name(),
            "prefixLen": partition.prefix_len(),
            "keyLen": partition.key_len(),
            "entries": store.count(partition.name())?,
        }));
    }
    Ok(Value::Array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios_terminology::{IndexStoreConfig, RepositoryConfig};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> TerminologyService {
        TerminologyService::open(
            dir.path(),
            IndexStoreConfig::default(),
            RepositoryConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_load_bundle_then_lookup() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let file = dir.path().join("bundle.json");
        fs::write(
            &file,
            json!({
                "resourceType": "Bundle",
                "entry": [
                    {"resource": {
                        "resourceType": "CodeSystem",
                        "url": "http://ex.org/cs",
                        "concept": [{"code": "A", "display": "Alpha"}]
                    }},
                    {"resource": {
                        "resourceType": "ValueSet",
                        "url": "http://ex.org/vs",
                        "compose": {"include": [{
                            "system": "http://ex.org/cs",
                            "concept": [{"code": "A"}]
                        }]}
                    }}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let loaded = execute(&svc, &Command::Load { file }).unwrap();
        assert_eq!(loaded["loaded"].as_array().unwrap().len(), 2);

        let hit = execute(
            &svc,
            &Command::Lookup {
                system: "http://ex.org/cs".to_string(),
                code: "A".to_string(),
                version: None,
            },
        )
        .unwrap();
        assert_eq!(hit["display"], "Alpha");

        let expansion = execute(
            &svc,
            &Command::Expand {
                url: "http://ex.org/vs".to_string(),
                version: None,
            },
        )
        .unwrap();
        assert_eq!(expansion["total"], 1);
    }

    #[test]
    fn test_partitions_lists_registry() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let listed = execute(&svc, &Command::Partitions).unwrap();
        let names: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(names.contains(&"CodeSystem.url"));
        assert!(names.contains(&"ValueSet.$expand"));
    }

    #[test]
    fn test_read_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let err = execute(
            &svc,
            &Command::Read {
                resource_type: ResourceType::CodeSystem,
                id: 42,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
