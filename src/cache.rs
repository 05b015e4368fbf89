use crate::resolver::Verdict;
use crate::types::{ActorId, EntityId};

/// Key for one memoized verdict.
///
/// The `epoch` component is stamped from the snapshot the verdict was
/// computed against, so entries from a replaced snapshot are structurally
/// unreachable; no invalidation call ordering can leak a stale decision.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub epoch: u64,
    pub actor: ActorId,
    pub action: String,
    pub entity: EntityId,
    pub entity_kind: String,
}

/// Cache interface for resolved verdicts.
///
/// Decisions are synchronous computations, so the cache is too.
pub trait DecisionCache: Send + Sync {
    /// Gets a memoized verdict.
    fn get(&self, key: &CacheKey) -> Option<Verdict>;

    /// Stores a verdict.
    fn insert(&self, key: CacheKey, verdict: Verdict);

    /// Drops every entry; used on logout teardown.
    fn clear(&self);
}

/// No-op cache implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl DecisionCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<Verdict> {
        None
    }

    fn insert(&self, _key: CacheKey, _verdict: Verdict) {}

    fn clear(&self) {}
}
