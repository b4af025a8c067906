//! Bridges a registered mailbox to its `Agent::handle_request` (§4.4). One
//! task per built-in role; a request the handler fails is answered with a
//! structured error reply rather than left to time out.

use std::sync::Arc;

use greenhouse_core::{Agent, Bus, Message, MessageKind};
use tokio::task::JoinHandle;
use tracing::warn;

#[must_use]
pub fn spawn_listener(bus: Arc<Bus>, agent_id: String, handler: Arc<dyn Agent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(request) = bus.receive(&agent_id).await else { break };
            if request.kind != MessageKind::Request {
                continue;
            }

            let reply = match handler.handle_request(&request).await {
                Ok(content) => Message::response(&agent_id, &request.from, content, request.id),
                Err(err) => {
                    warn!(agent_id = %agent_id, error = %err, "agent handler failed");
                    Message::response(
                        &agent_id,
                        &request.from,
                        serde_json::json!({ "status": "error", "error": err.to_string() }),
                        request.id,
                    )
                }
            };

            match reply {
                Ok(reply) => bus.resolve_response(reply).await,
                Err(err) => warn!(agent_id = %agent_id, error = %err, "failed to build response message"),
            }
        }
    })
}
