//! Parses inbound command frames and dispatches them against the rest of
//! the system (§4.9). Grounded on the legacy router's handler table and its
//! greenhouse fast-lane mapping, generalized from Python's dynamic dispatch
//! dict to an explicit match over a closed enum.

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use greenhouse_core::{ActuatorValue, AgentRuntime, Bus, SafetyWatchdog, Twin, WriteSource};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bridge::UiBridge;

pub type ShutdownCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Deserialize)]
pub struct CommandFrame {
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

/// Parse failures are reported as `COMMAND_ERROR`, never as a panic or a
/// dropped connection (§4.9 failure semantics).
#[derive(Debug, thiserror::Error)]
pub enum CommandParseError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub fn parse_command(line: &str) -> Result<CommandFrame, CommandParseError> {
    Ok(serde_json::from_str(line)?)
}

pub struct CommandPlane {
    agents: Arc<AgentRuntime>,
    twin: Arc<Twin>,
    bus: Arc<Bus>,
    ui: Arc<UiBridge>,
    watchdog: Arc<SafetyWatchdog>,
    agent_names: Mutex<BTreeMap<String, String>>,
    shutdown: Mutex<Option<ShutdownCallback>>,
    shutdown_fired: AtomicBool,
}

impl CommandPlane {
    #[must_use]
    pub fn new(
        agents: Arc<AgentRuntime>,
        twin: Arc<Twin>,
        bus: Arc<Bus>,
        ui: Arc<UiBridge>,
        watchdog: Arc<SafetyWatchdog>,
    ) -> Self {
        Self {
            agents,
            twin,
            bus,
            ui,
            watchdog,
            agent_names: Mutex::new(BTreeMap::new()),
            shutdown: Mutex::new(None),
            shutdown_fired: AtomicBool::new(false),
        }
    }

    pub async fn set_shutdown_callback(&self, callback: ShutdownCallback) {
        *self.shutdown.lock().await = Some(callback);
    }

    /// Routes one already-parsed frame. The closed command-tag set is
    /// exhaustively matched; anything else yields `COMMAND_ERROR`.
    pub async fn dispatch(&self, frame: CommandFrame) {
        match frame.command.as_str() {
            "SPAWN_AGENT" => self.handle_spawn(&frame.payload).await,
            "KILL_AGENT" => self.handle_kill(&frame.payload).await,
            "AGENT_MSG" => self.handle_agent_message(&frame.payload).await,
            "SLASH_COMMAND" => self.handle_slash_command(&frame.payload).await,
            "SYSTEM_SHUTDOWN" => self.handle_shutdown().await,
            "PING" => self.handle_ping().await,
            other => {
                warn!(command = other, "unknown command");
                self.error(&format!("unknown command: {other}")).await;
            }
        }
    }

    async fn success(&self, msg: &str) {
        self.ui.broadcast("COMMAND_SUCCESS", "router", serde_json::json!({ "msg": msg })).await;
    }

    async fn error(&self, reason: &str) {
        self.ui.broadcast("COMMAND_ERROR", "router", serde_json::json!({ "error": reason })).await;
    }

    async fn handle_spawn(&self, payload: &Value) {
        let (Some(role), Some(name)) = (
            payload.get("role").and_then(Value::as_str),
            payload.get("name").and_then(Value::as_str),
        ) else {
            self.error("SPAWN_AGENT requires role and name").await;
            return;
        };
        match self.agents.spawn(role).await {
            Ok(id) => {
                self.agent_names.lock().await.insert(name.to_string(), id.clone());
                info!(role, name, agent_id = %id, "agent spawned via command plane");
                self.success(&format!("spawned {name} ({role})")).await;
            }
            Err(err) => self.error(&err.to_string()).await,
        }
    }

    async fn handle_kill(&self, payload: &Value) {
        let Some(name) = payload.get("name").and_then(Value::as_str) else {
            self.error("KILL_AGENT requires name").await;
            return;
        };
        let id = self.agent_names.lock().await.remove(name);
        match id {
            Some(id) => {
                self.agents.kill(&id).await;
                self.success(&format!("killed {name}")).await;
            }
            None => self.error(&format!("no such agent: {name}")).await,
        }
    }

    async fn handle_agent_message(&self, payload: &Value) {
        let target = payload.get("target").and_then(Value::as_str).unwrap_or_default();
        let action = payload.get("action").and_then(Value::as_str).unwrap_or_default();

        if target.starts_with("greenhouse") {
            self.handle_greenhouse_action(action, payload).await;
            return;
        }

        let Some(agent_id) = self.agent_names.lock().await.get(target).cloned() else {
            self.error(&format!("unknown agent target: {target}")).await;
            return;
        };
        let message =
            match greenhouse_core::Message::event("router", &agent_id, payload.clone()) {
                Ok(message) => message,
                Err(err) => {
                    self.error(&err.to_string()).await;
                    return;
                }
            };
        match self.bus.send(message).await {
            Ok(()) => self.success(&format!("routed to {target}")).await,
            Err(err) => self.error(&err.to_string()).await,
        }
    }

    /// Checks `is_latched`/`validate_write` before writing, the same
    /// ordering `IndustrialBridge::write_setpoint` enforces; rejects the
    /// write outright rather than calling `set_actuator` on a latched or
    /// conflicting actuator.
    fn gated_set(&self, actuator_id: &str, value: ActuatorValue) -> bool {
        if self.watchdog.is_latched() {
            warn!(actuator = actuator_id, "write rejected, safety watchdog latched");
            return false;
        }
        let snapshot = self.twin.snapshot();
        let is_active = |id: &str| snapshot.actuators.get(id).copied().map(|v| v.as_bool()).unwrap_or(false);
        if !self.watchdog.validate_write(actuator_id, is_active) {
            warn!(actuator = actuator_id, "write rejected by safety watchdog");
            return false;
        }
        self.twin.set_actuator(actuator_id, value, WriteSource::User)
    }

    /// Greenhouse-targeted actions always carry `source=user`: UI commands
    /// always set a manual override, agents are never the origin here. Every
    /// write is gated through the watchdog first (§4.2: once latched, no
    /// write proceeds regardless of source), mirroring
    /// `IndustrialBridge::write_setpoint`.
    async fn handle_greenhouse_action(&self, action: &str, payload: &Value) {
        let ok = match action {
            "START_PUMP" => self.gated_set("pump_active", ActuatorValue::Bool(true)),
            "STOP_PUMP" => self.gated_set("pump_active", ActuatorValue::Bool(false)),
            "SET_HEATER" => {
                let on = payload.get("value").and_then(Value::as_bool).unwrap_or(false);
                self.gated_set("heater", ActuatorValue::Bool(on))
            }
            "CLEAR_OVERRIDE" => {
                let actuator = payload.get("actuator").and_then(Value::as_str).unwrap_or_default();
                self.twin.clear_override(actuator);
                true
            }
            "CLEAR_ALL_OVERRIDES" => {
                self.twin.clear_all_overrides();
                true
            }
            other => {
                self.error(&format!("unknown greenhouse action: {other}")).await;
                return;
            }
        };
        if ok {
            self.success(&format!("greenhouse action {action} executed")).await;
        } else {
            self.error(&format!("greenhouse action {action} rejected")).await;
        }
    }

    async fn handle_slash_command(&self, payload: &Value) {
        let cmd = payload.get("cmd").and_then(Value::as_str).unwrap_or_default().to_lowercase();
        let args = payload.get("args").and_then(Value::as_str).unwrap_or_default().to_lowercase();
        info!(cmd, args, "slash command received");

        match cmd.as_str() {
            "pump" => {
                let turning_on = args.contains("on");
                let action = if turning_on { "START_PUMP" } else { "STOP_PUMP" };
                self.handle_greenhouse_action(action, payload).await;
            }
            "status" => {
                let packet = self.twin.telemetry_packet();
                self.ui
                    .broadcast(
                        "SYSTEM_REPORT",
                        "router",
                        serde_json::json!({
                            "report": format!(
                                "temp={:.1}C ph={:.2}",
                                packet.temperature, packet.ph_level
                            ),
                        }),
                    )
                    .await;
            }
            "agent" if args.contains("spawn") => {
                let role = args.replace("spawn", "").trim().to_string();
                self.handle_spawn(&serde_json::json!({
                    "role": role,
                    "name": format!("{role}_manual"),
                }))
                .await;
            }
            other => {
                warn!(slash_command = other, "unknown slash command");
                self.error(&format!("unknown command: /{other}")).await;
            }
        }
    }

    /// Invokes the registered shutdown callback at most once.
    async fn handle_shutdown(&self) {
        if self.shutdown_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(callback) = self.shutdown.lock().await.clone() {
            callback().await;
        }
    }

    async fn handle_ping(&self) {
        self.ui
            .broadcast("PONG", "router", serde_json::json!({ "timestamp": chrono::Utc::now() }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn make_plane() -> CommandPlane {
        let bus = Arc::new(Bus::default());
        CommandPlane::new(
            Arc::new(AgentRuntime::new(PathBuf::from(std::env::temp_dir()), Arc::clone(&bus))),
            Arc::new(Twin::with_seed(60.0, 9)),
            bus,
            Arc::new(UiBridge::default()),
            Arc::new(SafetyWatchdog::default()),
        )
    }

    #[tokio::test]
    async fn unknown_command_does_not_panic() {
        let plane = make_plane();
        plane.dispatch(CommandFrame { command: "NOT_A_COMMAND".to_string(), payload: Value::Null }).await;
    }

    #[tokio::test]
    async fn greenhouse_pump_action_is_user_sourced() {
        let plane = make_plane();
        plane
            .dispatch(CommandFrame {
                command: "AGENT_MSG".to_string(),
                payload: serde_json::json!({"target": "greenhouse", "action": "START_PUMP"}),
            })
            .await;
        assert!(plane.twin.is_overridden("pump_active"));
    }

    #[tokio::test]
    async fn shutdown_callback_fires_exactly_once() {
        let plane = make_plane();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        plane
            .set_shutdown_callback(Arc::new(move || {
                let counted = Arc::clone(&counted);
                Box::pin(async move {
                    counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })
            }))
            .await;
        plane.dispatch(CommandFrame { command: "SYSTEM_SHUTDOWN".to_string(), payload: Value::Null }).await;
        plane.dispatch(CommandFrame { command: "SYSTEM_SHUTDOWN".to_string(), payload: Value::Null }).await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(parse_command("not json").is_err());
    }

    struct CapturingTransport(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl crate::transport::UiTransport for CapturingTransport {
        async fn send(&self, frame: &str) -> bool {
            self.0.lock().await.push(frame.to_string());
            true
        }
    }

    /// Scenario F: the command plane survives an empty line, unparsable
    /// JSON, an unknown command tag, a valid `PING`, and an oversized
    /// payload without ever panicking, emitting `COMMAND_ERROR`/`PONG` as
    /// appropriate for the ones that reach `dispatch`.
    #[tokio::test]
    async fn command_fuzzing_never_panics() {
        let plane = make_plane();
        let frames = Arc::new(Mutex::new(Vec::new()));
        plane.ui.register_transport("capture", Box::new(CapturingTransport(Arc::clone(&frames)))).await;

        assert!(parse_command("").is_err());
        assert!(parse_command("NOT_JSON").is_err());

        plane
            .dispatch(CommandFrame { command: "HACK".to_string(), payload: serde_json::json!({}) })
            .await;
        plane
            .dispatch(CommandFrame { command: "PING".to_string(), payload: serde_json::json!({"a": " "}) })
            .await;

        let huge_payload = serde_json::json!({ "blob": "x".repeat(100_000) });
        plane.dispatch(CommandFrame { command: "PING".to_string(), payload: huge_payload }).await;

        let captured = frames.lock().await;
        assert!(captured.iter().any(|f| f.contains("COMMAND_ERROR")));
        assert!(captured.iter().filter(|f| f.contains("PONG")).count() >= 2);
    }
}
