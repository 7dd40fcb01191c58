//! Transport implementations

pub mod memory;
pub mod simulated;

pub use memory::{DeviceEnd, DeviceEndpoints, MemoryTransport};
pub use simulated::{SimulatedDevice, SimulatorSettings};
