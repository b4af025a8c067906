//! HTTP/WebSocket ingress and egress (§6, §10.3). Axum is not part of the
//! teacher's stack; it is the pack's standard choice for an async JSON+WS
//! surface, enriched in from `prospectorengine-prospector-btc`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade, ws::{Message as WsMessage, WebSocket}},
    response::IntoResponse,
    routing::{get, post},
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use greenhouse_core::{ActuatorValue, AgentRuntime, Bus, SafetyWatchdog, Twin, WriteSource};
use greenhouse_ui::{CommandPlane, UiBridge, UiTransport, parse_command};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::warn;

use crate::settings::SettingsStore;

pub struct AppState {
    pub agents: Arc<AgentRuntime>,
    pub twin: Arc<Twin>,
    pub bus: Arc<Bus>,
    pub ui: Arc<UiBridge>,
    pub watchdog: Arc<SafetyWatchdog>,
    pub command_plane: Arc<CommandPlane>,
    pub settings: Arc<SettingsStore>,
    pub started_at: std::time::Instant,
}

#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/goal", post(goal))
        .route("/api/actuator", post(actuator))
        .route("/api/overrides", get(overrides))
        .route("/api/settings", get(get_settings).post(post_settings))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// §9: vector/graph memory stores are an explicit non-goal, so they are
/// always reported disabled rather than omitted from the shape UIs expect.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let agents = state.agents.list_all().await;
    Json(json!({
        "status": if state.watchdog.is_latched() { "emergency_stop" } else { "running" },
        "agents": agents.len(),
        "connections": agents.iter().filter(|a| a.state() != greenhouse_core::AgentState::Dead).count(),
        "uptime_s": state.started_at.elapsed().as_secs_f64(),
        "systems": {
            "vector": "disabled",
            "graph": "disabled",
            "simulation": if state.watchdog.is_latched() { "halted" } else { "active" },
        },
    }))
}

#[derive(Debug, Deserialize)]
struct GoalRequest {
    goal: String,
}

async fn goal(State(state): State<Arc<AppState>>, Json(req): Json<GoalRequest>) -> impl IntoResponse {
    let request = match greenhouse_core::Message::request("http", "supervisor_01", json!({ "goal": req.goal })) {
        Ok(request) => request,
        Err(err) => return Json(json!({ "error": err.to_string() })),
    };
    match state.bus.request(request).await {
        Ok(response) => Json(response.content),
        Err(err) => Json(json!({ "error": err.to_string() })),
    }
}

#[derive(Debug, Deserialize)]
struct ActuatorRequest {
    name: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    action: Option<String>,
}

/// Every actuator write reaching this endpoint is user-sourced (§4.9): the
/// HTTP surface is an operator channel, never an agent one. The closed
/// action set is `{set, toggle, clear_override, clear_all}`; every write
/// path is gated through the watchdog first, the same ordering
/// `IndustrialBridge::write_setpoint` enforces.
async fn actuator(State(state): State<Arc<AppState>>, Json(req): Json<ActuatorRequest>) -> impl IntoResponse {
    let action = req.action.as_deref().unwrap_or("set");

    match action {
        "clear_override" => {
            state.twin.clear_override(&req.name);
            let payload = format!("USER_CLEAR_OVERRIDE_{}", req.name);
            Json(json!({
                "status": "ok",
                "actuator": req.name,
                "override_active": state.twin.is_overridden(&req.name),
                "bcc": greenhouse_core::bcc::compute_bcc(&payload),
            }))
        }
        "clear_all" => {
            state.twin.clear_all_overrides();
            let payload = "USER_CLEAR_ALL_OVERRIDES".to_string();
            Json(json!({
                "status": "ok",
                "overrides": state.twin.override_ids(),
                "bcc": greenhouse_core::bcc::compute_bcc(&payload),
            }))
        }
        "toggle" => {
            let current = state.twin.snapshot().actuators.get(&req.name).copied().map(|v| v.as_bool()).unwrap_or(false);
            write_actuator(&state, &req.name, ActuatorValue::Bool(!current))
        }
        "set" => {
            let Some(raw) = req.value.clone() else {
                return Json(json!({ "status": "error", "error": "value is required for action=set" }));
            };
            let value = match raw {
                Value::Bool(b) => ActuatorValue::Bool(b),
                Value::Number(n) => ActuatorValue::Scalar(n.as_f64().unwrap_or(0.0)),
                other => {
                    return Json(json!({ "status": "error", "error": format!("unsupported actuator value: {other}") }));
                }
            };
            write_actuator(&state, &req.name, value)
        }
        other => Json(json!({ "status": "error", "error": format!("unknown actuator action: {other}") })),
    }
}

fn write_actuator(state: &Arc<AppState>, name: &str, value: ActuatorValue) -> Json<Value> {
    if state.watchdog.is_latched() {
        return Json(json!({ "status": "rejected", "actuator": name, "error": "safety watchdog latched" }));
    }
    let snapshot = state.twin.snapshot();
    let is_active = |id: &str| snapshot.actuators.get(id).copied().map(|v| v.as_bool()).unwrap_or(false);
    if !state.watchdog.validate_write(name, is_active) {
        return Json(json!({ "status": "rejected", "actuator": name, "error": "rejected by safety watchdog" }));
    }

    let ok = state.twin.set_actuator(name, value, WriteSource::User);
    let payload = format!("USER_SET_{name}_{value:?}");
    Json(json!({
        "status": if ok { "ok" } else { "rejected" },
        "actuator": name,
        "value": value,
        "override_active": state.twin.is_overridden(name),
        "bcc": greenhouse_core::bcc::compute_bcc(&payload),
    }))
}

async fn overrides(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ids = state.twin.override_ids();
    let overrides: std::collections::BTreeMap<String, bool> = ids.iter().map(|id| (id.clone(), true)).collect();
    Json(json!({ "overrides": overrides, "count": overrides.len() }))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.settings.load().await {
        Ok(value) => Json(json!({ "settings": value })),
        Err(err) => Json(json!({ "error": err.to_string() })),
    }
}

async fn post_settings(State(state): State<Arc<AppState>>, Json(settings): Json<Value>) -> impl IntoResponse {
    match state.settings.save(&settings).await {
        Ok(bcc) => Json(json!({ "status": "ok", "bcc": bcc })),
        Err(err) => Json(json!({ "status": "error", "error": err.to_string() })),
    }
}

async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct WsTransport {
    sender: mpsc::Sender<String>,
}

#[async_trait]
impl UiTransport for WsTransport {
    async fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).await.is_ok()
    }
}

/// One connection becomes one registered `UiTransport` (egress) and feeds
/// inbound text frames straight into the `CommandPlane` (ingress), mirroring
/// the stdin command loop's framing exactly.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let transport_id = uuid::Uuid::new_v4().to_string();

    state.ui.register_transport(transport_id.clone(), Box::new(WsTransport { sender: tx })).await;

    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        if let WsMessage::Text(text) = msg {
            match parse_command(&text) {
                Ok(frame) => state.command_plane.dispatch(frame).await,
                Err(err) => warn!(error = %err, "failed to parse inbound ws command"),
            }
        }
    }

    state.ui.remove_transport(&transport_id).await;
    forward.abort();
}
