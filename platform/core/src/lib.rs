//! Shared domain types and the in-process primitives every other crate in
//! the workspace builds on: digital-twin state, the A2A message bus, agent
//! lifecycle, safety interlocks, financial bookkeeping, and the integrity
//! marker used on external-facing writes.

pub mod agents;
pub mod bcc;
pub mod bus;
pub mod error;
pub mod finance;
pub mod mailbox;
pub mod message;
pub mod safety;
pub mod twin;

pub use agents::{Agent, AgentRecord, AgentRuntime, AgentState, SpawnFn};
pub use bus::Bus;
pub use error::{AgentError, CoreError};
pub use finance::FinanceTracker;
pub use mailbox::DropOldestQueue;
pub use message::{Message, MessageError, MessageKind, MessagePriority};
pub use safety::SafetyWatchdog;
pub use twin::{
    ActuatorValue, CropStage, OverrideSource, TelemetryPacket, Twin, TwinState, Weather,
    WriteSource, saturation_vapor_pressure_kpa,
};
