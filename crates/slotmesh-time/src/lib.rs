//! SlotMesh Time - Local clocks and network time synchronization
//!
//! This crate implements:
//! - `Clock`: the monotonic local tick source the scheduler reads
//! - `TimeSynchronizer`: reconciles received sync records into a phase
//!   anchor, slews corrections and decides what to broadcast

pub mod clock;
pub mod sync;

pub use clock::*;
pub use sync::*;
