//! The built-in `validation_chain` workflow: coder → tester → documenter →
//! validator (§4.6). Grounded on the legacy "Pass-the-Torch" chain.

use std::sync::Arc;

use greenhouse_core::{Bus, FinanceTracker, Message};
use greenhouse_ui::UiBridge;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::graph::{StepFn, WorkflowDefinition, WorkflowNode};
use crate::state::WorkflowState;

/// A generic guarded agent step: records utilization, announces the agent
/// as active, performs one A2A request, merges the reply into `data` under
/// `payload_key`, then announces success.
fn agent_step(
    agent_id: &'static str,
    task_name: &'static str,
    payload_key: &'static str,
    build_request: fn(&WorkflowState) -> Value,
    bus: Arc<Bus>,
    finance: Arc<Mutex<FinanceTracker>>,
    ui: Arc<UiBridge>,
) -> StepFn {
    Arc::new(move |mut state: WorkflowState| {
        let bus = Arc::clone(&bus);
        let finance = Arc::clone(&finance);
        let ui = Arc::clone(&ui);
        Box::pin(async move {
            finance.lock().await.log_utilization(agent_id);
            ui.broadcast_agent_status(agent_id, "active", serde_json::json!({ "task": task_name })).await;

            let request = build_request(&state);
            let outcome = match Message::request("orchestrator", agent_id, request) {
                Ok(message) => bus.request(message).await,
                Err(err) => Err(greenhouse_core::CoreError::Agent(
                    greenhouse_core::AgentError::HandlerFailed { agent_id: agent_id.to_string(), reason: err.to_string() },
                )),
            };

            match outcome {
                Ok(response) => {
                    state.data.insert(payload_key.to_string(), response.content);
                    ui.broadcast_agent_status(agent_id, "success", serde_json::json!({ "completed": true })).await;
                }
                Err(err) => {
                    warn!(agent_id, error = %err, "workflow step failed");
                    state.errors.push(err.to_string());
                    ui.broadcast_agent_status(agent_id, "error", serde_json::json!({ "reason": err.to_string() })).await;
                }
            }
            state
        })
    })
}

#[must_use]
pub fn validation_chain(bus: Arc<Bus>, finance: Arc<Mutex<FinanceTracker>>, ui: Arc<UiBridge>) -> WorkflowDefinition {
    let coder = agent_step(
        "coder_01",
        "Coding Phase",
        "code",
        |state| serde_json::json!({ "task": state.data.get("goal") }),
        Arc::clone(&bus),
        Arc::clone(&finance),
        Arc::clone(&ui),
    );
    let tester = agent_step(
        "tester_01",
        "Testing Phase",
        "test_report",
        |state| serde_json::json!({ "code": state.data.get("code") }),
        Arc::clone(&bus),
        Arc::clone(&finance),
        Arc::clone(&ui),
    );
    let documenter = agent_step(
        "documenter_01",
        "Documentation Phase",
        "docs",
        |state| serde_json::json!({ "code": state.data.get("code"), "tests": state.data.get("test_report") }),
        Arc::clone(&bus),
        Arc::clone(&finance),
        Arc::clone(&ui),
    );
    let validator_inner = agent_step(
        "validator_01",
        "Final Audit Phase",
        "validation_result",
        |state| {
            serde_json::json!({ "bundle": {
                "code": state.data.get("code"),
                "tests": state.data.get("test_report"),
                "docs": state.data.get("docs"),
            }})
        },
        Arc::clone(&bus),
        Arc::clone(&finance),
        Arc::clone(&ui),
    );

    // Extraction wraps the generic step: pulls `valid` out of the
    // validator's structured reply into `state.data.valid`.
    let validator: StepFn = Arc::new(move |state: WorkflowState| {
        let validator_inner = Arc::clone(&validator_inner);
        Box::pin(async move {
            let mut state = validator_inner(state).await;
            let valid = state
                .data
                .get("validation_result")
                .and_then(Value::as_object)
                .and_then(|obj| obj.get("valid"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            state.data.insert("valid".to_string(), Value::Bool(valid));
            state
        })
    });

    let nodes = vec![
        WorkflowNode::new("coder", "coder_01", coder, vec!["tester".to_string()]),
        WorkflowNode::new("tester", "tester_01", tester, vec!["documenter".to_string()]),
        WorkflowNode::new("documenter", "documenter_01", documenter, vec!["validator".to_string()]),
        WorkflowNode::new("validator", "validator_01", validator, vec![]),
    ];

    WorkflowDefinition::new("validation_chain", "Coder-to-validator pass-the-torch chain", nodes, "coder")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use greenhouse_core::MessageKind;

    use super::*;
    use crate::orchestrator::Orchestrator;
    use crate::state::WorkflowStatus;

    /// Answers every request on `agent_id` with `{status:"success",
    /// artifact:"<role>_ok"}`, injecting `valid:true` for the validator,
    /// exactly Scenario C's mocked agent contract. Stops once the bus
    /// mailbox is deregistered.
    fn spawn_stub(bus: Arc<Bus>, agent_id: &'static str, role: &'static str) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let Some(request) = bus.receive(agent_id).await else { break };
                if request.kind != MessageKind::Request {
                    continue;
                }
                let mut body = serde_json::json!({ "status": "success", "artifact": format!("{role}_ok") });
                if role == "validator" {
                    body["valid"] = Value::Bool(true);
                }
                let Ok(reply) = Message::response(agent_id, &request.from, body, request.id) else { continue };
                bus.resolve_response(reply).await;
            }
        })
    }

    async fn registered_bus(roles: &[(&'static str, &'static str)]) -> (Arc<Bus>, Vec<tokio::task::JoinHandle<()>>) {
        let bus = Arc::new(Bus::default());
        let mut handles = Vec::new();
        for (id, role) in roles {
            bus.register_agent(*id).await;
            handles.push(spawn_stub(Arc::clone(&bus), id, role));
        }
        (bus, handles)
    }

    #[tokio::test]
    async fn validation_chain_happy_path_runs_every_node_once() {
        let (bus, handles) = registered_bus(&[
            ("coder_01", "coder"),
            ("tester_01", "tester"),
            ("documenter_01", "documenter"),
            ("validator_01", "validator"),
        ])
        .await;
        let finance = Arc::new(Mutex::new(FinanceTracker::new()));
        let ui = Arc::new(UiBridge::default());
        let orchestrator = Orchestrator::new(Arc::clone(&ui), Arc::clone(&finance), Duration::from_secs(3600));
        orchestrator
            .register_workflow(validation_chain(Arc::clone(&bus), Arc::clone(&finance), Arc::clone(&ui)))
            .await;

        let mut initial_data = BTreeMap::new();
        initial_data.insert("goal".to_string(), Value::String("X".to_string()));
        let state = orchestrator.execute("validation_chain", initial_data).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        for key in ["goal", "code", "test_report", "docs", "validation_result", "valid"] {
            assert!(state.data.contains_key(key), "missing key {key}");
        }
        assert_eq!(state.data.get("valid"), Some(&Value::Bool(true)));
        assert!(state.errors.is_empty());

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn budget_cutoff_stops_the_chain_after_coder() {
        let bus = Arc::new(Bus::default());
        let finance = Arc::new(Mutex::new(FinanceTracker::new()));

        // The coder mock books a deficit large enough to flip `is_stable()`
        // before replying, so the orchestrator's viability check fails
        // ahead of the tester node rather than ahead of the coder node.
        let coder_finance = Arc::clone(&finance);
        bus.register_agent("coder_01").await;
        let coder_bus = Arc::clone(&bus);
        let coder = tokio::spawn(async move {
            let Some(request) = coder_bus.receive("coder_01").await else { return };
            coder_finance.lock().await.log_transaction(-1_000.0, "test", "force instability");
            let reply = Message::response(
                "coder_01",
                &request.from,
                serde_json::json!({ "status": "success", "artifact": "coder_ok" }),
                request.id,
            )
            .unwrap();
            coder_bus.resolve_response(reply).await;
        });

        // tester/documenter/validator are registered but must never be
        // dispatched; no mock listens on them.
        for id in ["tester_01", "documenter_01", "validator_01"] {
            bus.register_agent(id).await;
        }

        let ui = Arc::new(UiBridge::default());
        let orchestrator = Orchestrator::new(Arc::clone(&ui), Arc::clone(&finance), Duration::from_secs(3600));
        orchestrator
            .register_workflow(validation_chain(Arc::clone(&bus), Arc::clone(&finance), Arc::clone(&ui)))
            .await;

        let mut initial_data = BTreeMap::new();
        initial_data.insert("goal".to_string(), Value::String("X".to_string()));
        let state = orchestrator.execute("validation_chain", initial_data).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(state.data.contains_key("code"));
        assert!(!state.data.contains_key("test_report"));
        assert!(!state.data.contains_key("docs"));
        assert!(!state.data.contains_key("validation_result"));
        assert!(!state.errors.is_empty());

        coder.abort();
    }
}
