//! Error types for SlotMesh
//!
//! Only configuration problems are fatal. Everything that can go wrong while
//! the schedule is running is a [`Condition`]: counted and logged, never
//! propagated as an `Err`.

use std::time::Duration;

use thiserror::Error;

use crate::{NodeId, SyncTag};

/// Startup configuration errors. Any of these refuses to run the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no data rate specified (example: SLOTMESH_DATARATE=10 for 10 packets per second)")]
    MissingDataRate,

    #[error("data rate must be at least one packet per second")]
    ZeroDataRate,

    #[error("invalid data rate {0:?} in environment")]
    InvalidDataRateEnv(String),

    #[error("period must be non-zero")]
    InvalidPeriod,

    #[error("{slot} boundary {offset:?} outside period {period:?}")]
    BoundaryOutOfRange {
        slot: &'static str,
        offset: Duration,
        period: Duration,
    },

    #[error("{0} window is empty or inverted")]
    EmptyWindow(&'static str),

    #[error("{first} window overlaps or precedes {second} window")]
    OverlappingWindows {
        first: &'static str,
        second: &'static str,
    },

    #[error("schedule for device {0} has no slot windows")]
    NoWindows(NodeId),

    #[error("schedule belongs to device {schedule} but node is {node}")]
    DeviceMismatch { node: NodeId, schedule: NodeId },

    #[error("node {0} is configured as both relay and sink")]
    ConflictingRole(NodeId),

    #[error("{0} capacity must be non-zero")]
    ZeroCapacity(&'static str),

    #[error("invalid slot plan: {0}")]
    InvalidPlan(String),
}

/// SlotMesh errors
#[derive(Error, Debug)]
pub enum SlotmeshError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    // Configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Driver errors
    #[error("Radio channel closed")]
    RadioClosed,
}

/// Result type for SlotMesh operations
pub type SlotmeshResult<T> = Result<T, SlotmeshError>;

/// Non-fatal operating conditions, exposed for observability only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// A tick crossed more than one slot boundary; the scheduler snapped
    SchedulingSkew { skipped: u32 },
    /// A sync record with an out-of-order tag was discarded
    StaleSync { tag: Option<SyncTag> },
    /// The duplicate cache evicted a source to make room
    CacheEviction { evicted: NodeId },
    /// The relay queue shed its oldest record
    QueueOverflow { dropped_source: NodeId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_wraps() {
        let err: SlotmeshError = ConfigError::MissingDataRate.into();
        assert!(matches!(err, SlotmeshError::Config(ConfigError::MissingDataRate)));
        assert!(err.to_string().contains("no data rate"));
    }
}
