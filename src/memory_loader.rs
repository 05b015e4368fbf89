use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::loader::{LoadContext, SnapshotLoader};
use crate::snapshot::SnapshotPayload;

/// In-memory loader implementation for tests and demos.
///
/// Holds one canned payload per load context and can be flipped into a
/// failing mode to exercise load-failure paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    payloads: RwLock<HashMap<LoadContext, SnapshotPayload>>,
    failing: RwLock<bool>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload returned for a context.
    pub fn set_payload(&self, context: LoadContext, payload: SnapshotPayload) {
        let mut guard = self.inner.payloads.write().expect("poisoned lock");
        guard.insert(context, payload);
    }

    /// Makes every subsequent load fail until reset.
    pub fn set_failing(&self, failing: bool) {
        let mut guard = self.inner.failing.write().expect("poisoned lock");
        *guard = failing;
    }
}

#[async_trait]
impl SnapshotLoader for MemoryLoader {
    async fn load_snapshot(
        &self,
        context: &LoadContext,
    ) -> std::result::Result<SnapshotPayload, crate::LoadError> {
        if *self.inner.failing.read().expect("poisoned lock") {
            return Err("loader unavailable".into());
        }
        let guard = self.inner.payloads.read().expect("poisoned lock");
        guard
            .get(context)
            .cloned()
            .ok_or_else(|| format!("no payload for context {context:?}").into())
    }
}
