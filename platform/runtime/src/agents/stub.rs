//! Deterministic stand-ins for the coder/tester/documenter/validator roles
//! in the built-in `validation_chain` workflow (§4.6). Mirrors the mocked
//! agents in the pass-the-torch acceptance scenario: every call succeeds
//! and returns a structurally correct artifact, never doing actual work.

use async_trait::async_trait;
use greenhouse_core::{Agent, AgentError, Message};
use serde_json::{Value, json};

pub struct StubAgent {
    role: &'static str,
}

impl StubAgent {
    #[must_use]
    pub fn new(role: &'static str) -> Self {
        Self { role }
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn role(&self) -> &str {
        self.role
    }

    async fn handle_request(&self, _request: &Message) -> Result<Value, AgentError> {
        let mut body = json!({ "status": "success", "artifact": format!("{}_ok", self.role) });
        if self.role == "validator" {
            body["valid"] = Value::Bool(true);
        }
        Ok(body)
    }
}
