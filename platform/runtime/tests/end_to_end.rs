//! Scenario C end-to-end, exercised against the real `Runtime` composition
//! rather than hand-rolled mocks: `run_cli_goal` starts the built-in
//! pipeline listeners, runs `validation_chain` to completion, and tears
//! them back down without ever starting the Bridge, heartbeat, or HTTP
//! surface.

use greenhouse_config::RuntimeConfig;
use greenhouse_orchestrator::WorkflowStatus;
use greenhouse_runtime::Runtime;
use serde_json::Value;

fn test_config(dir: &std::path::Path) -> RuntimeConfig {
    RuntimeConfig {
        bind_addr: None,
        hardware_endpoint: None,
        settings_path: dir.join("settings.json"),
        event_log_path: dir.join("events.log"),
        budget: std::time::Duration::from_secs(3600),
        time_acceleration: 60.0,
    }
}

#[tokio::test]
async fn cli_goal_runs_validation_chain_to_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = Runtime::build(test_config(dir.path())).await.expect("runtime builds");

    let state = runtime.run_cli_goal("ship the greenhouse dashboard".to_string()).await.expect("workflow executes");

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.data.get("goal"), Some(&Value::String("ship the greenhouse dashboard".to_string())));
    for key in ["code", "test_report", "docs", "validation_result", "valid"] {
        assert!(state.data.contains_key(key), "missing key {key}");
    }
    assert_eq!(state.data.get("valid"), Some(&Value::Bool(true)));
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn two_sequential_cli_goals_both_complete() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = Runtime::build(test_config(dir.path())).await.expect("runtime builds");

    let first = runtime.run_cli_goal("goal one".to_string()).await.expect("first workflow executes");
    let second = runtime.run_cli_goal("goal two".to_string()).await.expect("second workflow executes");

    assert_eq!(first.status, WorkflowStatus::Completed);
    assert_eq!(second.status, WorkflowStatus::Completed);
    assert_eq!(second.data.get("goal"), Some(&Value::String("goal two".to_string())));
}
