//! Allocation engine: the port and session state machine

pub mod allocation;
pub mod hardware;

pub use allocation::{AllocationEngine, SharedAllocationEngine, StopAck};
pub use hardware::{HardwareAck, HardwareReport, HardwareStatusKind};
