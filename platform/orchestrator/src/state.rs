//! Per-execution workflow state (§4.6). A plain struct in place of the
//! legacy dynamic dict: every field a node can read or write is named here.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub workflow_id: Uuid,
    pub data: BTreeMap<String, Value>,
    pub current_step: String,
    pub agent_statuses: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub status: WorkflowStatus,
}

impl WorkflowState {
    #[must_use]
    pub fn new(initial_data: BTreeMap<String, Value>) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            data: initial_data,
            current_step: "init".to_string(),
            agent_statuses: BTreeMap::new(),
            errors: Vec::new(),
            status: WorkflowStatus::Running,
        }
    }
}
