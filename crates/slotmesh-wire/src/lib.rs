//! SlotMesh Wire Protocol - Binary frame format
//!
//! This crate implements the wire format for SlotMesh frames:
//! - Fixed header (6 bytes)
//! - Data body: up to BULK_SIZE scalar or bulk records
//! - Sync body: tagged beacon or bare marker

pub mod codec;
pub mod flags;
pub mod frame;
pub mod header;

pub use flags::*;
pub use frame::*;
pub use header::*;
