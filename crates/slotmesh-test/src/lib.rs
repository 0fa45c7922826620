//! SlotMesh Test Harness - Radio simulation and protocol validation
//!
//! This crate provides:
//! - Chaos links (loss, bursts, jitter, duplication)
//! - A multi-node radio simulator with drifting clocks
//! - A scenario builder that turns a collection tree into a running network
//! - The `slotmesh-sim` command line front end

pub mod chaos;
pub mod simulator;

pub use chaos::*;
pub use simulator::*;
