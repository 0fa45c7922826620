//! Relay/forwarding policy - what happens to a received data record
//!
//! Decision order for a record arriving in a frame addressed to `dest`:
//! 1. frame addressed to another node: discard (not for me)
//! 2. record originated here and was heard back: discard
//! 3. duplicate per the cache: discard
//! 4. hop limit reached: discard
//! 5. ordinary or sink: deliver to the application
//! 6. relay: queue a copy with one more hop for the next SEND window

use std::collections::VecDeque;

use slotmesh_core::{
    Condition, ConfigError, DataRecord, NodeId, NodeRole, RecordBatch, BULK_SIZE,
};
use tracing::{debug, warn};

use crate::{DuplicateCache, Verdict};

/// Relay settings
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Records held for the next SEND window
    pub queue_capacity: usize,
    /// Records that already travelled this many hops are not accepted
    pub max_hops: u8,
    /// Sources tracked by the duplicate cache
    pub cache_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            queue_capacity: 48,
            max_hops: 8,
            cache_capacity: 32,
        }
    }
}

impl RelayConfig {
    /// Small buffers for memory-constrained motes
    pub fn constrained() -> Self {
        RelayConfig {
            queue_capacity: 12,
            max_hops: 4,
            cache_capacity: 16,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("relay queue"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("duplicate cache"));
        }
        Ok(())
    }
}

/// Why a record was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    NotForMe,
    OwnRecord,
    Duplicate,
    HopLimit,
}

/// Decision for one received record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayDecision {
    /// Hand to the application
    Deliver(DataRecord),
    /// Queued for the next SEND window
    Forward,
    Discard(DiscardReason),
}

/// Bounded FIFO of records awaiting transmission
///
/// A push at capacity sheds the oldest record.
#[derive(Debug)]
pub struct RelayQueue {
    records: VecDeque<DataRecord>,
    capacity: usize,
    dropped: u64,
}

impl RelayQueue {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity("relay queue"));
        }
        Ok(RelayQueue {
            records: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        })
    }

    /// Append a record, returning the one shed to make room
    pub fn push(&mut self, record: DataRecord) -> Option<DataRecord> {
        let shed = if self.records.len() >= self.capacity {
            self.dropped += 1;
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        shed
    }

    /// Empty the queue into frame-sized batches, oldest first
    ///
    /// Every batch but the last is full; the last holds the remainder.
    pub fn drain_batches(&mut self) -> Vec<RecordBatch> {
        let mut batches = Vec::with_capacity(self.records.len().div_ceil(BULK_SIZE));
        let mut current = RecordBatch::new();
        for record in self.records.drain(..) {
            current.push(record);
            if current.is_full() {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records shed since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Counters for relay decisions
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: u64,
    pub forwarded: u64,
    pub not_for_me: u64,
    pub own_records: u64,
    pub duplicates: u64,
    pub hop_limited: u64,
}

/// Per-node relay policy with its duplicate cache and outgoing queue
#[derive(Debug)]
pub struct RelayPolicy {
    node: NodeId,
    role: NodeRole,
    max_hops: u8,
    cache: DuplicateCache,
    queue: RelayQueue,
    stats: RelayStats,
}

impl RelayPolicy {
    pub fn new(node: NodeId, role: NodeRole, config: &RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(RelayPolicy {
            node,
            role,
            max_hops: config.max_hops,
            cache: DuplicateCache::new(config.cache_capacity)?,
            queue: RelayQueue::new(config.queue_capacity)?,
            stats: RelayStats::default(),
        })
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Decide what to do with `record`, received in a frame addressed to
    /// `dest`. Non-fatal conditions are appended to `conditions`.
    pub fn handle(
        &mut self,
        record: DataRecord,
        dest: NodeId,
        conditions: &mut Vec<Condition>,
    ) -> RelayDecision {
        let decision = self.decide(record, dest, conditions);
        match &decision {
            RelayDecision::Deliver(_) => self.stats.delivered += 1,
            RelayDecision::Forward => self.stats.forwarded += 1,
            RelayDecision::Discard(reason) => match reason {
                DiscardReason::NotForMe => self.stats.not_for_me += 1,
                DiscardReason::OwnRecord => self.stats.own_records += 1,
                DiscardReason::Duplicate => self.stats.duplicates += 1,
                DiscardReason::HopLimit => self.stats.hop_limited += 1,
            },
        }
        decision
    }

    fn decide(
        &mut self,
        record: DataRecord,
        dest: NodeId,
        conditions: &mut Vec<Condition>,
    ) -> RelayDecision {
        if !(dest.is_broadcast() || dest == self.node) {
            return RelayDecision::Discard(DiscardReason::NotForMe);
        }
        if record.source == self.node {
            return RelayDecision::Discard(DiscardReason::OwnRecord);
        }

        let (verdict, evicted) = self.cache.observe_evicting(record.source, record.seq);
        if let Some(evicted) = evicted {
            conditions.push(Condition::CacheEviction { evicted });
        }
        if verdict == Verdict::Duplicate {
            return RelayDecision::Discard(DiscardReason::Duplicate);
        }

        if !self.role.forwards() {
            debug!(source = %record.source, seq = ?record.seq, "deliver");
            return RelayDecision::Deliver(record);
        }

        if record.hops >= self.max_hops {
            debug!(source = %record.source, hops = record.hops, "hop limit reached");
            return RelayDecision::Discard(DiscardReason::HopLimit);
        }
        debug!(source = %record.source, seq = ?record.seq, "forward");
        self.enqueue(record.relayed(), conditions);
        RelayDecision::Forward
    }

    /// Queue a record for the next SEND window (own readings use this too)
    pub fn enqueue(&mut self, record: DataRecord, conditions: &mut Vec<Condition>) {
        if let Some(shed) = self.queue.push(record) {
            warn!(source = %shed.source, seq = ?shed.seq, "relay queue overflow, oldest dropped");
            conditions.push(Condition::QueueOverflow {
                dropped_source: shed.source,
            });
        }
    }

    /// Batches to transmit when SEND opens
    pub fn flush(&mut self) -> Vec<RecordBatch> {
        self.queue.drain_batches()
    }

    pub fn queue(&self) -> &RelayQueue {
        &self.queue
    }

    pub fn cache(&self) -> &DuplicateCache {
        &self.cache
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmesh_core::SeqNo;

    const RELAY: NodeId = NodeId(33);
    const SINK: NodeId = NodeId(1);

    fn rec(source: u16, seq: u8) -> DataRecord {
        DataRecord::scalar(NodeId::new(source), SeqNo::new(seq), seq as u16)
    }

    fn relay_policy() -> RelayPolicy {
        RelayPolicy::new(RELAY, NodeRole::Relay, &RelayConfig::default()).unwrap()
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let mut queue = RelayQueue::new(5).unwrap();
        for seq in 1..=6 {
            queue.push(rec(3, seq));
        }
        assert_eq!(queue.dropped(), 1);

        let batches = queue.drain_batches();
        assert_eq!(batches.len(), 1);
        let seqs: Vec<u8> = batches[0].iter().map(|r| r.seq.0).collect();
        assert_eq!(seqs, vec![2, 3, 4, 5, 6]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_batches_full_then_partial() {
        let mut queue = RelayQueue::new(64).unwrap();
        for seq in 0..(2 * BULK_SIZE as u8 + 5) {
            queue.push(rec(3, seq));
        }
        let sizes: Vec<usize> = queue.drain_batches().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![BULK_SIZE, BULK_SIZE, 5]);
        assert!(queue.drain_batches().is_empty());
    }

    #[test]
    fn test_relay_forwards_with_extra_hop() {
        let mut policy = relay_policy();
        let mut conditions = Vec::new();

        assert_eq!(policy.handle(rec(3, 1), RELAY, &mut conditions), RelayDecision::Forward);
        assert_eq!(
            policy.handle(rec(3, 1), RELAY, &mut conditions),
            RelayDecision::Discard(DiscardReason::Duplicate)
        );

        let batches = policy.flush();
        assert_eq!(batches[0][0].hops, 1);
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_discards() {
        let mut policy = relay_policy();
        let mut conditions = Vec::new();

        assert_eq!(
            policy.handle(rec(3, 1), NodeId::new(28), &mut conditions),
            RelayDecision::Discard(DiscardReason::NotForMe)
        );
        assert_eq!(
            policy.handle(rec(33, 1), RELAY, &mut conditions),
            RelayDecision::Discard(DiscardReason::OwnRecord)
        );

        let mut tired = rec(6, 1);
        tired.hops = 8;
        assert_eq!(
            policy.handle(tired, NodeId::BROADCAST, &mut conditions),
            RelayDecision::Discard(DiscardReason::HopLimit)
        );

        // Not-for-me never touches the cache: the same record addressed to us is fresh
        assert_eq!(policy.handle(rec(3, 1), RELAY, &mut conditions), RelayDecision::Forward);
        assert_eq!(policy.stats().not_for_me, 1);
        assert_eq!(policy.stats().hop_limited, 1);
    }

    #[test]
    fn test_sink_delivers() {
        let mut policy = RelayPolicy::new(SINK, NodeRole::Sink, &RelayConfig::default()).unwrap();
        let mut conditions = Vec::new();
        let record = rec(3, 1).relayed();
        assert_eq!(
            policy.handle(record.clone(), SINK, &mut conditions),
            RelayDecision::Deliver(record)
        );
        assert!(policy.queue().is_empty());
    }

    #[test]
    fn test_overflow_and_eviction_are_reported() {
        let config = RelayConfig {
            queue_capacity: 1,
            max_hops: 8,
            cache_capacity: 1,
        };
        let mut policy = RelayPolicy::new(RELAY, NodeRole::Relay, &config).unwrap();
        let mut conditions = Vec::new();

        policy.handle(rec(3, 1), RELAY, &mut conditions);
        policy.handle(rec(4, 1), RELAY, &mut conditions);
        assert_eq!(
            conditions,
            vec![
                Condition::CacheEviction { evicted: NodeId::new(3) },
                Condition::QueueOverflow { dropped_source: NodeId::new(3) },
            ]
        );
    }

    #[test]
    fn test_zero_capacity_config() {
        let config = RelayConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(
            RelayPolicy::new(RELAY, NodeRole::Relay, &config).unwrap_err(),
            ConfigError::ZeroCapacity("relay queue")
        );
    }
}
