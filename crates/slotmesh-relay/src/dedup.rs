//! Duplicate suppression for data records
//!
//! One entry per source holds the newest sequence number seen from it. A
//! record is fresh only if its sequence number is ahead of that entry by
//! 1..=127 (serial arithmetic on u8). The cache has a fixed number of
//! entries; a new source arriving at capacity evicts the entry updated
//! longest ago, and that source is treated as unknown (fresh) next time.

use std::collections::HashMap;

use slotmesh_core::{ConfigError, NodeId, SeqNo};
use tracing::trace;

/// Outcome of observing a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Duplicate,
}

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    last_seen: SeqNo,
    /// Recency stamp of the last update
    stamp: u64,
}

/// Counters for cache activity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fresh: u64,
    pub duplicates: u64,
    pub evictions: u64,
}

/// Fixed-capacity recency store of (source, seq) pairs
#[derive(Debug)]
pub struct DuplicateCache {
    entries: HashMap<NodeId, CacheEntry>,
    capacity: usize,
    clock: u64,
    stats: CacheStats,
}

impl DuplicateCache {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity("duplicate cache"));
        }
        Ok(DuplicateCache {
            entries: HashMap::with_capacity(capacity),
            capacity,
            clock: 0,
            stats: CacheStats::default(),
        })
    }

    /// Record a sighting and report whether it was new
    pub fn observe(&mut self, source: NodeId, seq: SeqNo) -> Verdict {
        self.observe_evicting(source, seq).0
    }

    /// Like [`observe`](Self::observe), also naming any source evicted to
    /// make room
    pub fn observe_evicting(&mut self, source: NodeId, seq: SeqNo) -> (Verdict, Option<NodeId>) {
        self.clock += 1;
        let stamp = self.clock;

        if let Some(entry) = self.entries.get_mut(&source) {
            if seq.is_newer_than(entry.last_seen) {
                entry.last_seen = seq;
                entry.stamp = stamp;
                self.stats.fresh += 1;
                trace!(%source, ?seq, "fresh");
                return (Verdict::Fresh, None);
            }
            self.stats.duplicates += 1;
            trace!(%source, ?seq, last = ?entry.last_seen, "duplicate");
            return (Verdict::Duplicate, None);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.insert(
            source,
            CacheEntry {
                last_seen: seq,
                stamp,
            },
        );
        self.stats.fresh += 1;
        trace!(%source, ?seq, ?evicted, "fresh (new source)");
        (Verdict::Fresh, evicted)
    }

    fn evict_oldest(&mut self) -> Option<NodeId> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stamp)
            .map(|(id, _)| *id)?;
        self.entries.remove(&victim);
        self.stats.evictions += 1;
        Some(victim)
    }

    /// Newest sequence number held for `source`
    pub fn last_seen(&self, source: NodeId) -> Option<SeqNo> {
        self.entries.get(&source).map(|e| e.last_seen)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
