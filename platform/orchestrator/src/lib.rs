//! Graph-based multi-agent workflow execution with budget and financial
//! stability guardrails.

pub mod default_workflow;
pub mod graph;
pub mod orchestrator;
pub mod state;

pub use default_workflow::validation_chain;
pub use graph::{ConditionFn, StepFn, WorkflowDefinition, WorkflowNode};
pub use orchestrator::Orchestrator;
pub use state::{WorkflowState, WorkflowStatus};
