//! Per-resource write serialization.

use parking_lot::{Mutex, MutexGuard};

use crate::model::ResourceId;

const STRIPES: usize = 64;

/// Fixed set of mutexes; a resource id always maps to the same stripe.
///
/// Writers of the same resource are serialized so the envelope save and the
/// index batch of one write cannot interleave with another write's.
/// Unrelated resources only contend when they share a stripe.
pub(super) struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    pub(super) fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(super) fn lock(&self, id: ResourceId) -> MutexGuard<'_, ()> {
        self.stripes[id.get() as usize % STRIPES].lock()
    }
}
