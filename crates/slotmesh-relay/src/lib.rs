//! SlotMesh Relay - Duplicate suppression and store-and-forward
//!
//! This crate implements:
//! - `DuplicateCache`: fixed-capacity (source, seq) recency store
//! - `RelayQueue`: bounded outgoing queue, coalesced into frame batches
//! - `RelayPolicy`: per-record deliver / forward / discard decisions

pub mod dedup;
pub mod relay;

pub use dedup::*;
pub use relay::*;
