//! SlotMesh Runtime - Node orchestration
//!
//! A node is three cooperating parts driven by one clock:
//! 1. Time synchronizer: keeps the period phase aligned with the parent
//! 2. Slot scheduler: walks the schedule's windows, powers the radio
//! 3. Relay policy: delivers, forwards or discards received records
//!
//! [`Node`] is synchronous and runs each event to completion. [`NodeDriver`]
//! runs it on tokio against a pair of radio channels.

pub mod driver;
pub mod logging;
pub mod node;
pub mod scheduler;
pub mod sensor;
pub mod stats;

pub use driver::*;
pub use node::*;
pub use scheduler::*;
pub use sensor::{CounterSensor, SamplingMode, ScriptedSensor, SensorSource};
pub use stats::*;

pub(crate) use sensor::Sampler;
