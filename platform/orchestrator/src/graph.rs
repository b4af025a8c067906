//! Workflow graph types (§4.6). A node's `step` is an opaque async
//! transform over `WorkflowState`; the legacy `Callable[[WorkflowState],
//! WorkflowState]` becomes a boxed-future closure so nodes can capture
//! whatever dependencies they need (Bus, FinanceTracker, UiBridge) at
//! registration time instead of reaching for module-level globals.

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc};

use crate::state::WorkflowState;

pub type StepFn = Arc<dyn Fn(WorkflowState) -> Pin<Box<dyn Future<Output = WorkflowState> + Send>> + Send + Sync>;
pub type ConditionFn = Arc<dyn Fn(&WorkflowState) -> Option<String> + Send + Sync>;

pub struct WorkflowNode {
    pub name: String,
    pub agent_id: String,
    pub step: StepFn,
    pub next: Vec<String>,
    pub condition: Option<ConditionFn>,
}

impl WorkflowNode {
    #[must_use]
    pub fn new(name: impl Into<String>, agent_id: impl Into<String>, step: StepFn, next: Vec<String>) -> Self {
        Self { name: name.into(), agent_id: agent_id.into(), step, next, condition: None }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: ConditionFn) -> Self {
        self.condition = Some(condition);
        self
    }
}

pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub nodes: BTreeMap<String, WorkflowNode>,
    pub entry_node: String,
}

impl WorkflowDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, nodes: Vec<WorkflowNode>, entry_node: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            nodes: nodes.into_iter().map(|n| (n.name.clone(), n)).collect(),
            entry_node: entry_node.into(),
        }
    }

    #[must_use]
    pub fn get_node(&self, name: &str) -> Option<&WorkflowNode> {
        self.nodes.get(name)
    }
}
