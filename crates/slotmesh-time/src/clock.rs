//! Local clock sources
//!
//! The scheduler only ever asks for "now". Clocks are monotonic; they may
//! run fast or slow relative to their neighbours, which the synchronizer
//! corrects by moving the phase anchor, never the clock itself.

use slotmesh_core::LocalTime;

/// Monotonic local tick counter
pub trait Clock {
    fn now(&self) -> LocalTime;
}
