//! Spawning, lookup, and teardown of agent instances (§4.4 AgentRuntime).
//! Role registration is separate from spawning: a role names a constructor,
//! spawning invokes it and assigns the new instance a scratch directory.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Arc,
};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{Agent, AgentRecord, AgentState};
use crate::bus::Bus;
use crate::error::AgentError;
use crate::message::MessageKind;

/// A role's constructor: builds a fresh handler instance per spawn so
/// per-agent state is never shared across instances of the same role.
/// Returns an owned `Box` (not yet shared) so `initialize` can still take
/// `&mut self` before the instance is frozen into the record's `Arc`.
pub type SpawnFn = Arc<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

pub struct AgentRuntime {
    scratch_root: PathBuf,
    bus: Arc<Bus>,
    roles: RwLock<BTreeMap<String, (SpawnFn, BTreeSet<String>)>>,
    agents: RwLock<BTreeMap<String, Arc<AgentRecord>>>,
    listeners: RwLock<BTreeMap<String, JoinHandle<()>>>,
}

impl AgentRuntime {
    /// `bus` is where every spawned agent is registered so it can be
    /// addressed over A2A messaging the moment `spawn` returns.
    #[must_use]
    pub fn new(scratch_root: PathBuf, bus: Arc<Bus>) -> Self {
        Self {
            scratch_root,
            bus,
            roles: RwLock::new(BTreeMap::new()),
            agents: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a role and the capability tags every instance of it carries.
    /// Re-registering a role replaces its constructor; existing instances are
    /// unaffected.
    pub async fn register_role(
        &self,
        role: impl Into<String>,
        capabilities: BTreeSet<String>,
        spawn: SpawnFn,
    ) {
        self.roles.write().await.insert(role.into(), (spawn, capabilities));
    }

    /// Instantiates a new agent of `role`, creates its scratch directory,
    /// runs its `initialize`, registers it on the bus, and transitions it to
    /// `Ready`. The handler owns everything under the scratch directory; the
    /// runtime only creates it.
    #[instrument(skip(self))]
    pub async fn spawn(&self, role: &str) -> Result<String, AgentError> {
        let (spawn, capabilities) = {
            let roles = self.roles.read().await;
            roles
                .get(role)
                .map(|(f, caps)| (Arc::clone(f), caps.clone()))
                .ok_or_else(|| AgentError::InitFailed {
                    agent_id: role.to_string(),
                    reason: "no such role registered".to_string(),
                })?
        };

        let id = format!("{role}-{}", Uuid::new_v4());
        let scratch_path = self.scratch_root.join(&id);
        tokio::fs::create_dir_all(&scratch_path).await.map_err(|err| AgentError::InitFailed {
            agent_id: id.clone(),
            reason: format!("failed to create scratch directory: {err}"),
        })?;

        let mut handler = spawn();
        if let Err(err) = handler.initialize().await {
            warn!(agent_id = %id, error = %err, "agent initialization failed");
            return Err(err);
        }
        let handler: Arc<dyn Agent> = Arc::from(handler);

        let record = Arc::new(AgentRecord::new(
            id.clone(),
            role.to_string(),
            capabilities,
            scratch_path,
            Arc::clone(&handler),
        ));
        self.agents.write().await.insert(id.clone(), Arc::clone(&record));
        record.set_state(AgentState::Ready);

        self.bus.register_agent(&id).await;
        let listener = self.spawn_listener(id.clone(), handler);
        self.listeners.write().await.insert(id.clone(), listener);

        info!(agent_id = %id, role, "agent spawned");
        Ok(id)
    }

    /// Bridges the agent's bus mailbox to its `handle_request`, mirroring
    /// the runtime's built-in-role listener loop so a dynamically spawned
    /// agent is reachable over `AGENT_MSG`/A2A the same way.
    fn spawn_listener(&self, agent_id: String, handler: Arc<dyn Agent>) -> JoinHandle<()> {
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            loop {
                let Some(request) = bus.receive(&agent_id).await else { break };
                if request.kind != MessageKind::Request {
                    continue;
                }
                let reply = match handler.handle_request(&request).await {
                    Ok(content) => crate::message::Message::response(&agent_id, &request.from, content, request.id),
                    Err(err) => {
                        warn!(agent_id = %agent_id, error = %err, "agent handler failed");
                        crate::message::Message::response(
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

    /// Marks an agent `Draining` so in-flight requests finish but no new ones
    /// are accepted, tears it down, deregisters its mailbox, and removes the
    /// record.
    pub async fn kill(&self, agent_id: &str) {
        let record = {
            let mut agents = self.agents.write().await;
            agents.remove(agent_id)
        };
        let Some(record) = record else { return };
        record.set_state(AgentState::Draining);
        // Arc::get_mut only succeeds once every other clone (in-flight
        // requests holding a handler reference) has dropped, which is the
        // draining contract already guarantees by the time kill is called.
        record.set_state(AgentState::Dead);

        if let Some(listener) = self.listeners.write().await.remove(agent_id) {
            listener.abort();
        }
        self.bus.deregister_agent(agent_id).await;
        info!(agent_id, "agent killed");
    }

    #[must_use]
    pub async fn get(&self, agent_id: &str) -> Option<Arc<AgentRecord>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    #[must_use]
    pub async fn list_by_role(&self, role: &str) -> Vec<Arc<AgentRecord>> {
        self.agents
            .read()
            .await
            .values()
            .filter(|record| record.role == role)
            .cloned()
            .collect()
    }

    #[must_use]
    pub async fn list_all(&self) -> Vec<Arc<AgentRecord>> {
        self.agents.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::message::Message;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        fn role(&self) -> &str {
            "echo"
        }

        async fn handle_request(&self, request: &Message) -> Result<Value, AgentError> {
            Ok(request.content.clone())
        }
    }

    fn make_runtime() -> AgentRuntime {
        AgentRuntime::new(std::env::temp_dir(), Arc::new(Bus::default()))
    }

    #[tokio::test]
    async fn spawn_assigns_ready_state_and_unique_ids() {
        let runtime = make_runtime();
        runtime
            .register_role("echo", BTreeSet::new(), Arc::new(|| Box::new(Echo) as Box<dyn Agent>))
            .await;

        let a = runtime.spawn("echo").await.unwrap();
        let b = runtime.spawn("echo").await.unwrap();
        assert_ne!(a, b);

        let record = runtime.get(&a).await.unwrap();
        assert_eq!(record.state(), AgentState::Ready);

        let response = record
            .handler()
            .handle_request(&Message::request("tester", &a, json!({"x": 1})).unwrap())
            .await
            .unwrap();
        assert_eq!(response, json!({"x": 1}));
    }

    /// A spawned agent's mailbox is immediately reachable over the bus, not
    /// just present in the local role table.
    #[tokio::test]
    async fn spawned_agent_is_reachable_over_the_bus() {
        let bus = Arc::new(Bus::default());
        let runtime = AgentRuntime::new(std::env::temp_dir(), Arc::clone(&bus));
        runtime
            .register_role("echo", BTreeSet::new(), Arc::new(|| Box::new(Echo) as Box<dyn Agent>))
            .await;
        let id = runtime.spawn("echo").await.unwrap();

        let request = Message::request("tester", &id, json!({"x": 2})).unwrap();
        let response = bus.request(request).await.unwrap();
        assert_eq!(response.content, json!({"x": 2}));
    }

    #[tokio::test]
    async fn kill_removes_the_record() {
        let runtime = make_runtime();
        runtime
            .register_role("echo", BTreeSet::new(), Arc::new(|| Box::new(Echo) as Box<dyn Agent>))
            .await;
        let id = runtime.spawn("echo").await.unwrap();
        runtime.kill(&id).await;
        assert!(runtime.get(&id).await.is_none());
    }
}
