//! Records exchanged between nodes
//!
//! - `DataRecord`: one sensor observation (or a bulk batch of readings)
//! - `SyncRecord`: a timing beacon carrying the time left in the period

use std::time::Duration;

use arrayvec::ArrayVec;

use crate::{NodeId, SeqNo, SyncTag};

/// Maximum readings in a bulk payload, and maximum records per data frame
pub const BULK_SIZE: usize = 12;

/// Fixed-capacity batch of readings
pub type Readings = ArrayVec<u16, BULK_SIZE>;

/// Records carried by one data frame
pub type RecordBatch = ArrayVec<DataRecord, BULK_SIZE>;

/// Sensor payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// One reading per record
    Scalar(u16),
    /// Up to `BULK_SIZE` readings taken in order
    Bulk(Readings),
}

impl Payload {
    /// Number of readings carried
    pub fn len(&self) -> usize {
        match self {
            Payload::Scalar(_) => 1,
            Payload::Bulk(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate readings in order
    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        let slice: &[u16] = match self {
            Payload::Scalar(v) => std::slice::from_ref(v),
            Payload::Bulk(values) => values.as_slice(),
        };
        slice.iter().copied()
    }
}

/// One sensor observation travelling toward the sink
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRecord {
    /// Originating node
    pub source: NodeId,
    /// Per-source sequence number
    pub seq: SeqNo,
    /// Relay hops travelled so far
    pub hops: u8,
    /// Reading(s)
    pub payload: Payload,
}

impl DataRecord {
    pub fn new(source: NodeId, seq: SeqNo, payload: Payload) -> Self {
        DataRecord {
            source,
            seq,
            hops: 0,
            payload,
        }
    }

    pub fn scalar(source: NodeId, seq: SeqNo, value: u16) -> Self {
        Self::new(source, seq, Payload::Scalar(value))
    }

    /// Copy of this record as re-emitted by a relay
    pub fn relayed(&self) -> Self {
        DataRecord {
            hops: self.hops.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Timing beacon
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncRecord {
    /// Round tag; `None` for the bare marker variant
    pub tag: Option<SyncTag>,
    /// Time left in the sender's current period when it transmitted
    pub remaining: Duration,
    /// Remaining echo budget
    pub ttl: u8,
}

impl SyncRecord {
    pub fn tagged(tag: SyncTag, remaining: Duration, ttl: u8) -> Self {
        SyncRecord {
            tag: Some(tag),
            remaining,
            ttl,
        }
    }

    /// Bare marker: reception itself signals `remaining` before the boundary
    pub fn marker(remaining: Duration) -> Self {
        SyncRecord {
            tag: None,
            remaining,
            ttl: 0,
        }
    }
}
