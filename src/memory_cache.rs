use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cache::{CacheKey, DecisionCache};
use crate::resolver::Verdict;

/// In-memory LRU cache for resolved verdicts.
///
/// Entries are keyed by snapshot epoch, so entries belonging to a replaced
/// snapshot simply stop being hit and age out of the recency queue.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<CacheState>>,
    capacity: usize,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<CacheKey, Verdict>,
    order: VecDeque<CacheKey>,
}

impl MemoryCache {
    /// Creates a new cache with the given capacity.
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity,
        }
    }

    fn touch(state: &mut CacheState, key: &CacheKey) {
        state.order.retain(|existing| existing != key);
        state.order.push_back(key.clone());
    }

    fn evict_if_needed(state: &mut CacheState, capacity: usize) {
        while state.entries.len() > capacity {
            if let Some(key) = state.order.pop_front() {
                state.entries.remove(&key);
            } else {
                break;
            }
        }
    }
}

impl DecisionCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Verdict> {
        if self.capacity == 0 {
            return None;
        }

        let mut guard = self.inner.lock().expect("poisoned lock");
        let verdict = guard.entries.get(key).cloned();
        if verdict.is_some() {
            Self::touch(&mut guard, key);
        }
        verdict
    }

    fn insert(&self, key: CacheKey, verdict: Verdict) {
        if self.capacity == 0 {
            return;
        }

        let mut guard = self.inner.lock().expect("poisoned lock");
        guard.entries.insert(key.clone(), verdict);
        Self::touch(&mut guard, &key);
        Self::evict_if_needed(&mut guard, self.capacity);
    }

    fn clear(&self) {
        let mut guard = self.inner.lock().expect("poisoned lock");
        guard.entries.clear();
        guard.order.clear();
    }
}
