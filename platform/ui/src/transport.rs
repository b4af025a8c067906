//! Pluggable sinks for framed UI events. A transport that returns `false`
//! from `send` is dropped from the active set on the caller's next
//! broadcast — never does a broken connection propagate an error upward.

use async_trait::async_trait;

#[async_trait]
pub trait UiTransport: Send + Sync {
    /// Sends one already-serialized frame. Returns `false` if the transport
    /// is no longer usable and should be removed.
    async fn send(&self, frame: &str) -> bool;
}

/// Writes frames to stdout prefixed with `::SUDO::`, the delimiter external
/// shell/desktop wrappers use to separate IPC frames from ordinary log
/// lines sharing the same stream.
pub struct StdoutTransport;

#[async_trait]
impl UiTransport for StdoutTransport {
    async fn send(&self, frame: &str) -> bool {
        println!("::SUDO::{frame}");
        true
    }
}
