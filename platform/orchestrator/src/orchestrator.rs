//! Executes registered workflow graphs with budget enforcement (§4.6).
//! Grounded on the legacy `WorkflowOrchestrator.execute_workflow` loop and
//! `AgencyOrchestrator.check_viability`.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use greenhouse_core::{CoreError, FinanceTracker};
use greenhouse_ui::UiBridge;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument};

use crate::graph::WorkflowDefinition;
use crate::state::{WorkflowState, WorkflowStatus};

pub struct Orchestrator {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
    ui: Arc<UiBridge>,
    finance: Arc<Mutex<FinanceTracker>>,
    budget: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(ui: Arc<UiBridge>, finance: Arc<Mutex<FinanceTracker>>, budget: Duration) -> Self {
        Self { workflows: RwLock::new(HashMap::new()), ui, finance, budget }
    }

    pub async fn register_workflow(&self, definition: WorkflowDefinition) {
        let name = definition.name.clone();
        self.workflows.write().await.insert(name.clone(), definition);
        info!(workflow = name, "workflow registered");
    }

    /// True iff elapsed time since `started_at` is within budget and the
    /// ledger is still stable. A workflow that has not yet started is
    /// always viable.
    pub async fn check_viability(&self, started_at: Instant) -> bool {
        if started_at.elapsed() > self.budget {
            error!("stop signal: budget exceeded");
            return false;
        }
        if !self.finance.lock().await.is_stable() {
            error!("stop signal: financial stability violation");
            return false;
        }
        true
    }

    /// Runs `name` from its entry node to completion or failure, ticking
    /// the UI heartbeat before and after every node so a slow agent step
    /// does not trip the stall detector.
    #[instrument(skip(self, initial_data))]
    pub async fn execute(&self, name: &str, initial_data: BTreeMap<String, Value>) -> Result<WorkflowState, CoreError> {
        // WorkflowDefinition holds trait-object closures, so it is looked up
        // fresh per node rather than held across an `.await` point.
        let workflow_name = name.to_string();
        let entry = self
            .entry_node(&workflow_name)
            .await
            .ok_or_else(|| CoreError::UnknownWorkflow(workflow_name.clone()))?;

        let started_at = Instant::now();
        let mut state = WorkflowState::new(initial_data);
        let mut current = Some(entry);
        let mut visited = BTreeMap::new();

        info!(workflow_id = %state.workflow_id, workflow = %workflow_name, "workflow starting");

        while let Some(node_name) = current {
            if *visited.entry(node_name.clone()).or_insert(0u32) >= 1 {
                state.errors.push(format!("node {node_name} revisited in a single execution"));
                state.status = WorkflowStatus::Failed;
                break;
            }
            *visited.get_mut(&node_name).unwrap() += 1;

            if !self.check_viability(started_at).await {
                state.status = WorkflowStatus::Failed;
                break;
            }

            let workflows = self.workflows.read().await;
            let Some(wf) = workflows.get(&workflow_name) else {
                state.errors.push(format!("workflow {workflow_name} disappeared mid-execution"));
                state.status = WorkflowStatus::Failed;
                break;
            };
            let Some(node) = wf.get_node(&node_name) else {
                state.errors.push(format!("node {node_name} not found"));
                state.status = WorkflowStatus::Failed;
                break;
            };

            state.current_step = node_name.clone();
            let step = Arc::clone(&node.step);
            let condition = node.condition.clone();
            let next = node.next.clone();
            drop(workflows);

            self.ui.tick().await;
            state = step(state).await;
            self.ui.tick().await;

            current = if let Some(condition) = condition {
                condition(&state)
            } else {
                next.first().cloned()
            };
        }

        if state.status == WorkflowStatus::Running {
            state.status = WorkflowStatus::Completed;
        }
        info!(workflow_id = %state.workflow_id, status = ?state.status, "workflow finished");
        Ok(state)
    }

    async fn entry_node(&self, name: &str) -> Option<String> {
        self.workflows.read().await.get(name).map(|wf| wf.entry_node.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::graph::WorkflowNode;

    fn passthrough_step(key: &'static str) -> crate::graph::StepFn {
        Arc::new(move |mut state: WorkflowState| {
            Box::pin(async move {
                state.data.insert(key.to_string(), Value::Bool(true));
                state
            })
        })
    }

    #[tokio::test]
    async fn unknown_workflow_is_an_error() {
        let orchestrator = Orchestrator::new(Arc::new(UiBridge::default()), Arc::new(Mutex::new(FinanceTracker::new())), Duration::from_secs(3600));
        let err = orchestrator.execute("nope", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownWorkflow(name) if name == "nope"));
    }

    #[tokio::test]
    async fn linear_chain_runs_to_completion() {
        let orchestrator = Orchestrator::new(Arc::new(UiBridge::default()), Arc::new(Mutex::new(FinanceTracker::new())), Duration::from_secs(3600));
        let nodes = vec![
            WorkflowNode::new("a", "agent-a", passthrough_step("a_done"), vec!["b".to_string()]),
            WorkflowNode::new("b", "agent-b", passthrough_step("b_done"), vec![]),
        ];
        orchestrator
            .register_workflow(WorkflowDefinition::new("chain", "test chain", nodes, "a"))
            .await;

        let state = orchestrator.execute("chain", BTreeMap::new()).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.data.get("a_done"), Some(&Value::Bool(true)));
        assert_eq!(state.data.get("b_done"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn zero_budget_fails_immediately() {
        let orchestrator = Orchestrator::new(Arc::new(UiBridge::default()), Arc::new(Mutex::new(FinanceTracker::new())), Duration::from_secs(0));
        let nodes = vec![WorkflowNode::new("a", "agent-a", passthrough_step("a_done"), vec![])];
        orchestrator
            .register_workflow(WorkflowDefinition::new("chain", "test chain", nodes, "a"))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let state = orchestrator.execute("chain", BTreeMap::new()).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
    }
}
