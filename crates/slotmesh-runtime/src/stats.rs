//! Node counters

use slotmesh_core::Condition;

/// Runtime statistics for one node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub ticks: u64,
    pub samples: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Frames still queued when their window closed
    pub frames_abandoned: u64,
    pub decode_errors: u64,
    /// Frames that arrived while the receiver was off
    pub radio_off_drops: u64,
    pub delivered: u64,

    // Non-fatal conditions
    pub scheduling_skew: u64,
    pub skipped_boundaries: u64,
    pub stale_sync: u64,
    pub cache_evictions: u64,
    pub queue_overflows: u64,
}

impl NodeStats {
    pub fn record(&mut self, condition: &Condition) {
        match condition {
            Condition::SchedulingSkew { skipped } => {
                self.scheduling_skew += 1;
                self.skipped_boundaries += *skipped as u64;
            }
            Condition::StaleSync { .. } => self.stale_sync += 1,
            Condition::CacheEviction { .. } => self.cache_evictions += 1,
            Condition::QueueOverflow { .. } => self.queue_overflows += 1,
        }
    }

    /// Total non-fatal conditions seen
    pub fn conditions(&self) -> u64 {
        self.scheduling_skew + self.stale_sync + self.cache_evictions + self.queue_overflows
    }
}
