//! The only legitimate path between the outside world (or the Twin in
//! simulation mode) and the rest of the platform.

pub mod bridge;
pub mod transport;

pub use bridge::{BridgeMode, IndustrialBridge, vapor_pressure_deficit};
pub use transport::{HardwareTransport, NullHardwareTransport};
