//! Terminology service.
//!
//! [`TerminologyService`] is the entry point the binary (or an embedding
//! server) talks to. It owns the shared index store and repository, routes
//! CRUD and search calls to the [`ResourceManager`] of the resource type, and
//! answers `$lookup`, `$validate-code` and `$expand` from the operation
//! partitions.
//!
//! Operation answers are read from index values, then confirmed against the
//! stored resource: a hash collision or a stale entry never produces a result.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::codec::{self, ConceptId, IndexValue, MemberValue};
use crate::config::{IndexStoreConfig, RepositoryConfig};
use crate::error::{RequestError, TerminologyResult};
use crate::manager::{OperationHit, ResourceManager};
use crate::model::terminology::{concepts, members};
use crate::model::{ResourceId, ResourceType};
use crate::partition::{OperationKind, PartitionCompiler};
use crate::repository::{ResourceEnvelope, ResourceRepository, SqliteResourceRepository};
use crate::store::IndexStore;

/// `CodeSystem/$lookup` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Code system url.
    pub system: String,
    /// Code.
    pub code: String,
    /// Code system version; the most recent code system wins when absent.
    pub version: Option<String>,
}

/// `CodeSystem/$lookup` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    /// Internal concept id.
    pub concept_id: ConceptId,
    /// The code system holding the concept.
    pub resource_id: ResourceId,
    /// Code system url.
    pub system: String,
    /// Code system version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Code system name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Code.
    pub code: String,
    /// Concept display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// `ValueSet/$validate-code` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateCodeRequest {
    /// Value set url.
    pub url: String,
    /// Code system url.
    pub system: String,
    /// Code.
    pub code: String,
    /// Code system version the member must carry.
    pub system_version: Option<String>,
}

/// `ValueSet/$validate-code` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateCodeResult {
    /// Whether the code is a member of the value set.
    pub valid: bool,
    /// Display of the matching member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// The value set that contained the code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<ResourceId>,
    /// Reason the code was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `ValueSet/$expand` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandRequest {
    /// Value set url.
    pub url: String,
    /// Value set version; the most recent value set wins when absent.
    pub version: Option<String>,
}

/// `ValueSet/$expand` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expansion {
    /// The expanded value set.
    pub value_set: ResourceId,
    /// Value set url.
    pub url: String,
    /// Value set version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Number of members.
    pub total: usize,
    /// Members in value set order.
    pub contains: Vec<MemberValue>,
}

/// Terminology operations over one index store and repository.
pub struct TerminologyService {
    store: Arc<IndexStore>,
    repository: Arc<dyn ResourceRepository>,
    code_systems: ResourceManager,
    value_sets: ResourceManager,
}

impl std::fmt::Debug for TerminologyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TerminologyService {
    /// Creates a service over an opened store and repository.
    pub fn new(store: Arc<IndexStore>, repository: Arc<dyn ResourceRepository>) -> Self {
        let manager = |rt| ResourceManager::new(rt, Arc::clone(&store), Arc::clone(&repository));
        let code_systems = manager(ResourceType::CodeSystem);
        let value_sets = manager(ResourceType::ValueSet);
        Self {
            store,
            repository,
            code_systems,
            value_sets,
        }
    }

    /// Compiles the standard partitions and opens `resources.db` and
    /// `index.db` under `data_dir`.
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        store_config: IndexStoreConfig,
        repository_config: RepositoryConfig,
    ) -> TerminologyResult<Self> {
        let data_dir = data_dir.as_ref();
        let registry = Arc::new(PartitionCompiler::standard().compile()?);
        let repository =
            SqliteResourceRepository::open(data_dir.join("resources.db"), repository_config)?;
        let store = IndexStore::open(data_dir.join("index.db"), registry, store_config)?;

        info!(data_dir = %data_dir.display(), "Terminology service ready");
        Ok(Self::new(Arc::new(store), Arc::new(repository)))
    }

    /// The shared index store.
    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// The shared envelope repository.
    pub fn repository(&self) -> &Arc<dyn ResourceRepository> {
        &self.repository
    }

    /// The manager of a resource type.
    pub fn manager(&self, resource_type: ResourceType) -> &ResourceManager {
        match resource_type {
            ResourceType::CodeSystem => &self.code_systems,
            ResourceType::ValueSet => &self.value_sets,
        }
    }

    /// Creates a resource, routed by its `resourceType`.
    pub fn create(&self, content: Value) -> TerminologyResult<ResourceEnvelope> {
        let resource_type = resource_type_of(&content)?;
        self.manager(resource_type).create(content)
    }

    /// Reads a resource.
    pub fn read(
        &self,
        resource_type: ResourceType,
        id: ResourceId,
    ) -> TerminologyResult<Option<ResourceEnvelope>> {
        self.manager(resource_type).read(id)
    }

    /// Replaces the content of a resource.
    pub fn update(&self, id: ResourceId, content: Value) -> TerminologyResult<ResourceEnvelope> {
        let resource_type = resource_type_of(&content)?;
        self.manager(resource_type).update(id, content)
    }

    /// Deletes a resource.
    pub fn delete(&self, resource_type: ResourceType, id: ResourceId) -> TerminologyResult<bool> {
        self.manager(resource_type).delete(id)
    }

    /// Equality search on one parameter.
    pub fn search(
        &self,
        resource_type: ResourceType,
        param: &str,
        value: &str,
    ) -> TerminologyResult<Vec<ResourceEnvelope>> {
        self.manager(resource_type).search(param, value)
    }

    /// `CodeSystem/$lookup`.
    pub fn lookup(&self, request: &LookupRequest) -> TerminologyResult<Option<LookupResult>> {
        let prefix =
            codec::lookup_prefix(&request.system, &request.code, request.version.as_deref());
        let mut hits = self
            .code_systems
            .scan_operation(OperationKind::Lookup, &prefix)?;
        hits.sort_by(|a, b| b.resource_id.cmp(&a.resource_id));

        for hit in hits {
            let IndexValue::Concept(concept_id) = hit.value else {
                continue;
            };
            let Some(envelope) = self.code_systems.read(concept_id.resource_id())? else {
                continue;
            };
            let content = &envelope.content;
            if str_field(content, "url") != Some(request.system.as_str()) {
                continue;
            }
            if let Some(version) = &request.version
                && str_field(content, "version") != Some(version.as_str())
            {
                continue;
            }
            let Some(concept) = concepts(content)?
                .into_iter()
                .nth(concept_id.ordinal() as usize)
                .filter(|c| c.code == request.code)
            else {
                continue;
            };

            debug!(resource_id = %envelope.id, concept_id = %concept_id, "Lookup hit");
            return Ok(Some(LookupResult {
                concept_id,
                resource_id: envelope.id,
                system: concept.system,
                version: concept.version,
                name: str_field(content, "name").map(str::to_string),
                code: concept.code,
                display: concept.display,
            }));
        }
        Ok(None)
    }

    /// `ValueSet/$validate-code`.
    pub fn validate_code(
        &self,
        request: &ValidateCodeRequest,
    ) -> TerminologyResult<ValidateCodeResult> {
        let prefix = codec::validate_code_prefix(
            &request.url,
            &request.system,
            &request.code,
            request.system_version.as_deref(),
        );
        let hits = self
            .value_sets
            .scan_operation(OperationKind::ValidateCode, &prefix)?;

        for id in newest_first(&hits) {
            let Some(envelope) = self.value_sets.read(id)? else {
                continue;
            };
            if str_field(&envelope.content, "url") != Some(request.url.as_str()) {
                continue;
            }
            let found = members(&envelope.content)?.into_iter().find(|m| {
                m.system == request.system
                    && m.code == request.code
                    && request
                        .system_version
                        .as_ref()
                        .is_none_or(|v| m.system_version.as_ref() == Some(v))
            });
            if let Some(member) = found {
                return Ok(ValidateCodeResult {
                    valid: true,
                    display: member.display,
                    value_set: Some(envelope.id),
                    message: None,
                });
            }
        }

        let message = if self.value_sets.search("url", &request.url)?.is_empty() {
            format!("value set {} not found", request.url)
        } else {
            format!(
                "code {}|{} is not in value set {}",
                request.system, request.code, request.url
            )
        };
        Ok(ValidateCodeResult {
            valid: false,
            display: None,
            value_set: None,
            message: Some(message),
        })
    }

    /// `ValueSet/$expand`.
    pub fn expand(&self, request: &ExpandRequest) -> TerminologyResult<Option<Expansion>> {
        let prefix = codec::expansion_prefix(&request.url, request.version.as_deref());
        let hits = self
            .value_sets
            .scan_operation(OperationKind::Expand, &prefix)?;

        for id in newest_first(&hits) {
            let Some(envelope) = self.value_sets.read(id)? else {
                continue;
            };
            let content = &envelope.content;
            if str_field(content, "url") != Some(request.url.as_str()) {
                continue;
            }
            let version = str_field(content, "version").map(str::to_string);
            if request.version.is_some() && request.version != version {
                continue;
            }

            let contains: Vec<MemberValue> = hits
                .iter()
                .filter(|hit| hit.resource_id == id)
                .filter_map(|hit| match &hit.value {
                    IndexValue::Member(member) => Some(member.clone()),
                    IndexValue::Concept(_) => None,
                })
                .collect();

            debug!(resource_id = %id, members = contains.len(), "Expanded value set");
            return Ok(Some(Expansion {
                value_set: id,
                url: request.url.clone(),
                version,
                total: contains.len(),
                contains,
            }));
        }
        Ok(None)
    }

    /// Closes the index store. Idempotent.
    pub fn shutdown(&self) -> TerminologyResult<()> {
        self.store.close()?;
        Ok(())
    }
}

fn str_field<'a>(content: &'a Value, field: &str) -> Option<&'a str> {
    content.get(field).and_then(Value::as_str)
}

fn resource_type_of(content: &Value) -> Result<ResourceType, RequestError> {
    let raw = str_field(content, "resourceType").unwrap_or_default();
    raw.parse().map_err(|message| RequestError::InvalidValue {
        param: "resourceType".to_string(),
        value: raw.to_string(),
        message,
    })
}

/// Distinct resource ids of `hits`, highest first.
fn newest_first(hits: &[OperationHit]) -> impl Iterator<Item = ResourceId> {
    hits.iter()
        .map(|hit| hit.resource_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .rev()
}
