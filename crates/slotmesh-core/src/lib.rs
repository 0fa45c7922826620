//! SlotMesh Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout SlotMesh:
//! - Identifiers (NodeId, SeqNo, SyncTag) with wraparound ordering
//! - Time primitives (LocalTime, PhaseAnchor)
//! - Data and sync records
//! - Slot schedules, deployment layouts and slot plans
//! - Roles, data rate and errors

pub mod error;
pub mod id;
pub mod plan;
pub mod rate;
pub mod record;
pub mod role;
pub mod schedule;
pub mod time;

pub use error::*;
pub use id::*;
pub use plan::*;
pub use rate::*;
pub use record::*;
pub use role::*;
pub use schedule::*;
pub use time::*;
