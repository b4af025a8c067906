use thiserror::Error;

/// Cross-cutting error taxonomy shared by Bus, AgentRuntime, and Orchestrator.
/// Component-local failure modes that never cross a boundary (e.g. a rejected
/// actuator write, which is a `bool`, not an error) are not represented here.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no agent registered for id {0:?}")]
    Addressing(String),

    #[error("request to {to:?} exceeded its deadline of {deadline_ms}ms")]
    Timeout { to: String, deadline_ms: u64 },

    #[error("mailbox for agent {0:?} is full")]
    MailboxFull(String),

    #[error("agent {0:?} is draining or dead and refuses new requests")]
    AgentUnavailable(String),

    #[error("workflow {0:?} is not registered")]
    UnknownWorkflow(String),

    #[error("workflow revisited node {node:?} in a single execution")]
    WorkflowCycle { node: String },

    #[error("budget exhausted: {reason}")]
    BudgetExceeded { reason: String },

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Failure returned by an agent handler, distinct from transport-level
/// failures (`CoreError`) that never reach the handler at all.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent {agent_id:?} failed to initialize: {reason}")]
    InitFailed { agent_id: String, reason: String },

    #[error("agent {agent_id:?} handler returned an error: {reason}")]
    HandlerFailed { agent_id: String, reason: String },

    #[error("agent {agent_id:?} did not respond within its deadline")]
    DeadlineExceeded { agent_id: String },
}
