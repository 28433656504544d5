use std::collections::HashMap;

use crate::{
    fingerprint::{FileId, Fingerprint},
    line::CacheLine,
};

/// Associative lookup from [`Fingerprint`] to [`CacheLine`] (spec §4.1).
/// Backed by a `HashMap` rather than harvid's packed-key hash table: same
/// O(1) expected lookup/insert, and keying by `Fingerprint` directly makes
/// invariant I4 (at most one line per fingerprint) hold structurally
/// instead of needing to be checked.
pub(crate) struct CacheIndex {
    capacity: usize,
    lines: HashMap<Fingerprint, CacheLine>,
}

impl CacheIndex {
    pub fn new(capacity: usize) -> Self {
        CacheIndex {
            capacity,
            lines: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.capacity
    }

    pub fn get(&self, key: &Fingerprint) -> Option<&CacheLine> {
        self.lines.get(key)
    }

    pub fn get_mut(&mut self, key: &Fingerprint) -> Option<&mut CacheLine> {
        self.lines.get_mut(key)
    }

    pub fn insert(&mut self, key: Fingerprint, line: CacheLine) {
        self.lines.insert(key, line);
    }

    pub fn remove(&mut self, key: &Fingerprint) -> Option<CacheLine> {
        self.lines.remove(key)
    }

    /// O(N) scan over the whole index; used for the eviction scan (spec
    /// §4.3 transition 3), flush, and the stats snapshot (spec §4.1, §4.5).
    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &CacheLine)> {
        self.lines.iter()
    }

    /// The LRU-smallest unpinned line, optionally restricted to one file
    /// (spec §4.3 transition 3, §4.2 `flush`). Ties break by iteration
    /// order, matching harvid's `HASH_ITER` walk.
    pub fn find_victim(&self, file_id: Option<FileId>) -> Option<Fingerprint> {
        self.lines
            .iter()
            .filter(|(fp, line)| {
                line.state.is_evictable() && file_id.map_or(true, |id| fp.id == id)
            })
            .min_by_key(|(_, line)| line.lru)
            .map(|(fp, _)| *fp)
    }
}
