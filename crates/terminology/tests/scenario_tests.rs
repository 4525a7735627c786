//! End-to-end scenarios over the service, the manager and the index store.

mod common;

use common::*;

use helios_terminology::codec::ConceptId;
use helios_terminology::error::IndexError;
use helios_terminology::model::{ConceptElement, Element};
use helios_terminology::service::LookupRequest;
use helios_terminology::{PartitionCompiler, ResourceId, ResourceType};

fn lookup_a() -> LookupRequest {
    LookupRequest {
        system: CS_URL.to_string(),
        code: "A".to_string(),
        version: None,
    }
}

#[test]
fn test_create_then_lookup_returns_concept_id() {
    let t = TestService::new();

    let created = t.service.create(alpha_code_system()).unwrap();
    let hit = t.service.lookup(&lookup_a()).unwrap().expect("concept A");

    assert_eq!(hit.concept_id, ConceptId::new(created.id, 0));
    assert_eq!(hit.resource_id, created.id);
    assert_eq!(hit.system, CS_URL);
    assert_eq!(hit.code, "A");
    assert_eq!(hit.display.as_deref(), Some("Alpha"));
    assert_eq!(hit.name.as_deref(), Some("Example"));
}

#[test]
fn test_search_by_url_returns_every_version() {
    let t = TestService::new();

    let v1 = t
        .service
        .create(CodeSystemFixture::new(CS_URL).with_version("1").build())
        .unwrap();
    let v2 = t
        .service
        .create(CodeSystemFixture::new(CS_URL).with_version("2").build())
        .unwrap();
    t.service
        .create(CodeSystemFixture::new("http://ex.org/other").build())
        .unwrap();

    let ids: Vec<ResourceId> = t
        .service
        .search(ResourceType::CodeSystem, "url", CS_URL)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![v1.id, v2.id]);

    let versioned = t
        .service
        .search(ResourceType::CodeSystem, "version", "2")
        .unwrap();
    assert_eq!(versioned.len(), 1);
    assert_eq!(versioned[0].id, v2.id);
}

#[test]
fn test_deleted_code_system_is_not_found() {
    let t = TestService::new();

    let created = t.service.create(alpha_code_system()).unwrap();
    assert!(t.service.lookup(&lookup_a()).unwrap().is_some());

    assert!(t.service.delete(ResourceType::CodeSystem, created.id).unwrap());
    assert!(t.service.lookup(&lookup_a()).unwrap().is_none());
    assert!(
        t.service
            .search(ResourceType::CodeSystem, "url", CS_URL)
            .unwrap()
            .is_empty()
    );

    // every partition entry of the resource is gone
    let store = t.service.store();
    for partition in store.registry().partitions_for(ResourceType::CodeSystem) {
        assert_eq!(store.count(partition.name()).unwrap(), 0, "{}", partition.name());
    }

    assert!(!t.service.delete(ResourceType::CodeSystem, created.id).unwrap());
}

fn concept_entries(resource: u32, count: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    let registry = PartitionCompiler::standard().compile().unwrap();
    let partition = registry.get("CodeSystem.$lookup").unwrap();
    (0..count)
        .map(|ordinal| {
            let concept = Element::Concept(ConceptElement {
                system: CS_URL.to_string(),
                version: Some("1".to_string()),
                code: format!("C{}", ordinal),
                display: None,
                ordinal,
            });
            partition
                .entry(&concept, ResourceId::new(resource))
                .unwrap()
        })
        .collect()
}

#[test]
fn test_thousand_entry_batch_is_atomic() {
    let entries = concept_entries(1, 1000);

    let dir = tempfile::TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut batch = store.batch();
    for (key, value) in &entries {
        batch.put("CodeSystem.$lookup", key.clone(), value.clone());
    }
    assert_eq!(store.submit(batch).unwrap(), 1000);

    for (key, value) in &entries {
        assert_eq!(
            store.seek("CodeSystem.$lookup", key).unwrap().as_ref(),
            Some(value)
        );
    }
    assert_eq!(store.count("CodeSystem.$lookup").unwrap(), 1000);
}

#[test]
fn test_failed_thousand_entry_batch_leaves_nothing() {
    let entries = concept_entries(2, 1000);

    let dir = tempfile::TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut batch = store.batch();
    for (key, value) in &entries {
        batch.put("CodeSystem.$lookup", key.clone(), value.clone());
    }
    // fails after every valid entry has been staged
    batch.put("CodeSystem.$lookup", vec![0; 3], Vec::new());

    let err = store.submit(batch).unwrap_err();
    assert!(matches!(err, IndexError::KeyLength { actual: 3, .. }));

    assert_eq!(store.count("CodeSystem.$lookup").unwrap(), 0);
    for (key, _) in entries.iter().step_by(97) {
        assert_eq!(store.seek("CodeSystem.$lookup", key).unwrap(), None);
    }
}
