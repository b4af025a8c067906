//! Entry point for user goals (§6 `POST /api/goal`). The HTTP layer never
//! touches the orchestrator directly: a goal crosses the same A2A boundary
//! an agent-issued request would, by addressing this handler over the bus.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use greenhouse_core::{Agent, AgentError, Message};
use greenhouse_orchestrator::Orchestrator;
use serde_json::Value;

pub struct SupervisorAgent {
    orchestrator: Arc<Orchestrator>,
}

impl SupervisorAgent {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Agent for SupervisorAgent {
    fn role(&self) -> &str {
        "supervisor"
    }

    async fn handle_request(&self, request: &Message) -> Result<Value, AgentError> {
        let goal = request.content.get("goal").and_then(Value::as_str).unwrap_or_default().to_string();
        let mut initial_data = BTreeMap::new();
        initial_data.insert("goal".to_string(), Value::String(goal));

        let result = self.orchestrator.execute("validation_chain", initial_data).await.map_err(|err| {
            AgentError::HandlerFailed { agent_id: "supervisor_01".to_string(), reason: err.to_string() }
        })?;

        serde_json::to_value(&result)
            .map_err(|err| AgentError::HandlerFailed { agent_id: "supervisor_01".to_string(), reason: err.to_string() })
    }
}
