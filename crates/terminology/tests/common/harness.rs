//! Service and store harnesses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;

use helios_terminology::error::RepositoryError;
use helios_terminology::repository::{
    EnvelopeDraft, RepositoryResult, ResourceEnvelope, ResourceRepository,
};
use helios_terminology::{
    IndexStore, IndexStoreConfig, PartitionCompiler, RepositoryConfig, ResourceId, ResourceType,
    SqliteResourceRepository, TerminologyService,
};

/// Small iterator pages so scans cross page boundaries.
pub fn store_config() -> IndexStoreConfig {
    IndexStoreConfig {
        scan_page_size: 4,
        ..Default::default()
    }
}

/// Opens an index store with the standard partitions under `dir`.
pub fn open_store(dir: &TempDir) -> IndexStore {
    let registry = Arc::new(
        PartitionCompiler::standard()
            .compile()
            .expect("standard partitions compile"),
    );
    IndexStore::open(dir.path().join("index.db"), registry, store_config())
        .expect("Failed to open index store")
}

/// Opens the envelope repository under `dir`.
pub fn open_repository(dir: &TempDir) -> SqliteResourceRepository {
    SqliteResourceRepository::open(dir.path().join("resources.db"), RepositoryConfig::default())
        .expect("Failed to open repository")
}

/// A service over file databases in a private temporary directory.
pub struct TestService {
    pub dir: TempDir,
    pub service: TerminologyService,
    pub repository: Arc<FailingRepository>,
}

impl TestService {
    /// A fresh service.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (service, repository) = Self::open(&dir);
        Self {
            dir,
            service,
            repository,
        }
    }

    /// Reopens both databases, as after a restart.
    pub fn reopen(self) -> Self {
        let TestService { dir, service, .. } = self;
        service.shutdown().expect("Failed to shut down");
        drop(service);
        let (service, repository) = Self::open(&dir);
        Self {
            dir,
            service,
            repository,
        }
    }

    fn open(dir: &TempDir) -> (TerminologyService, Arc<FailingRepository>) {
        let repository = Arc::new(FailingRepository::new(open_repository(dir)));
        let store = Arc::new(open_store(dir));
        let shared: Arc<dyn ResourceRepository> = repository.clone();
        let service = TerminologyService::new(store, shared);
        (service, repository)
    }
}

/// Repository wrapper whose writes can be switched to fail.
pub struct FailingRepository {
    inner: SqliteResourceRepository,
    fail_saves: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FailingRepository {
    pub fn new(inner: SqliteResourceRepository) -> Self {
        Self {
            inner,
            fail_saves: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn injected(operation: &str) -> RepositoryError {
        RepositoryError::Pool {
            message: format!("injected {} failure", operation),
        }
    }
}

impl ResourceRepository for FailingRepository {
    fn save(&self, draft: EnvelopeDraft) -> RepositoryResult<ResourceEnvelope> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::injected("save"));
        }
        self.inner.save(draft)
    }

    fn find_by_id(&self, id: ResourceId) -> RepositoryResult<Option<ResourceEnvelope>> {
        self.inner.find_by_id(id)
    }

    fn delete_by_id(&self, id: ResourceId) -> RepositoryResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete_by_id(id)
    }

    fn find_ids_by_type(&self, resource_type: ResourceType) -> RepositoryResult<Vec<ResourceId>> {
        self.inner.find_ids_by_type(resource_type)
    }
}
