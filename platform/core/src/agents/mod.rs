//! Agent lifecycle and the handler contract every role implements (§3
//! AgentRecord, §4.4 AgentRuntime). Agents are modeled as values implementing
//! a fixed interface, never as a class hierarchy with late-bound attributes
//! (§9 redesign note).

mod runtime;

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;

pub use runtime::{AgentRuntime, SpawnFn};

use crate::error::AgentError;
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Spawning,
    Ready,
    Busy,
    Draining,
    Dead,
}

impl AgentState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Spawning => 0,
            Self::Ready => 1,
            Self::Busy => 2,
            Self::Draining => 3,
            Self::Dead => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Spawning,
            1 => Self::Ready,
            2 => Self::Busy,
            3 => Self::Draining,
            _ => Self::Dead,
        }
    }
}

/// The fixed capability interface every role implements. Per-agent
/// configuration is passed at construction time through `SpawnFn`, not
/// attached to the instance later.
#[async_trait]
pub trait Agent: Send + Sync {
    fn role(&self) -> &str;

    /// Optional async setup; the default is a no-op so simple handlers need
    /// not override it.
    async fn initialize(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Consumes a request and produces a response body within the runtime's
    /// enforced deadline. Errors are structured, never raised as exceptions.
    async fn handle_request(&self, request: &Message) -> Result<Value, AgentError>;

    async fn teardown(&mut self) {}
}

/// Runtime handle for a spawned agent: identity, lifecycle state, and the
/// scratch directory the handler has exclusive write access to.
pub struct AgentRecord {
    pub id: String,
    pub role: String,
    pub capabilities: BTreeSet<String>,
    pub scratch_path: PathBuf,
    handler: Arc<dyn Agent>,
    state: AtomicU8,
}

impl AgentRecord {
    pub(crate) fn new(
        id: String,
        role: String,
        capabilities: BTreeSet<String>,
        scratch_path: PathBuf,
        handler: Arc<dyn Agent>,
    ) -> Self {
        Self {
            id,
            role,
            capabilities,
            scratch_path,
            handler,
            state: AtomicU8::new(AgentState::Spawning.to_u8()),
        }
    }

    #[must_use]
    pub fn state(&self) -> AgentState {
        AgentState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    #[must_use]
    pub fn handler(&self) -> Arc<dyn Agent> {
        Arc::clone(&self.handler)
    }

    #[must_use]
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }
}
