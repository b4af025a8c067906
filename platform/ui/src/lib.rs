//! UI-facing event fan-out and command ingress: the two components that
//! mediate between the rest of the platform and whatever is driving it
//! (a terminal, a desktop shell, a WebSocket client).

pub mod bridge;
pub mod command_plane;
pub mod transport;

pub use bridge::{UiBridge, default_heartbeat_interval};
pub use command_plane::{CommandFrame, CommandParseError, CommandPlane, ShutdownCallback, parse_command};
pub use transport::{StdoutTransport, UiTransport};
