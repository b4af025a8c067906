//! Event fan-out to connected UIs plus dead-man's-switch stall detection
//! (§4.8). Grounded on the legacy bridge's tick/heartbeat pattern, adapted
//! from a daemon thread to a cancellable tokio task.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::transport::UiTransport;

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct IpcEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    event: String,
    agent_id: String,
    data: Value,
    timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct UiBridge {
    transports: RwLock<BTreeMap<String, Box<dyn UiTransport>>>,
    last_tick: Mutex<Instant>,
    created_at: Instant,
    stall_threshold: Duration,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for UiBridge {
    fn default() -> Self {
        Self::new(DEFAULT_STALL_THRESHOLD)
    }
}

impl UiBridge {
    #[must_use]
    pub fn new(stall_threshold: Duration) -> Self {
        let now = Instant::now();
        Self {
            transports: RwLock::new(BTreeMap::new()),
            last_tick: Mutex::new(now),
            created_at: now,
            stall_threshold,
            heartbeat_handle: Mutex::new(None),
        }
    }

    pub async fn register_transport(&self, id: impl Into<String>, transport: Box<dyn UiTransport>) {
        self.transports.write().await.insert(id.into(), transport);
    }

    pub async fn remove_transport(&self, id: &str) {
        self.transports.write().await.remove(id);
    }

    /// Serializes and fans an event out to every connected transport.
    /// Transports whose `send` returns `false` are dropped from the active
    /// set; `broadcast` never blocks the caller on a stalled connection
    /// beyond the single `send` call itself.
    pub async fn broadcast(&self, event_type: impl Into<String>, agent_id: impl Into<String>, payload: Value) {
        let event = IpcEvent {
            kind: "IPC_EVENT",
            event: event_type.into(),
            agent_id: agent_id.into(),
            data: payload,
            timestamp: chrono::Utc::now(),
        };
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "failed to serialize IPC event");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let transports = self.transports.read().await;
            for (id, transport) in transports.iter() {
                if !transport.send(&frame).await {
                    dead.push(id.clone());
                }
            }
        }
        if !dead.is_empty() {
            let mut transports = self.transports.write().await;
            for id in dead {
                transports.remove(&id);
            }
        }
    }

    pub async fn broadcast_agent_status(&self, agent_id: &str, status: &str, details: Value) {
        self.broadcast(format!("AGENT_{}", status.to_uppercase()), agent_id, details).await;
        self.tick().await;
    }

    pub async fn broadcast_workflow_step(&self, workflow_id: &str, current_node: &str, status: &str) {
        self.broadcast(
            "WORKFLOW_UPDATE",
            "orchestrator",
            serde_json::json!({
                "workflow_id": workflow_id,
                "current_node": current_node,
                "status": status,
            }),
        )
        .await;
        self.tick().await;
    }

    pub async fn tick(&self) {
        *self.last_tick.lock().await = Instant::now();
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Spawns the periodic heartbeat task. A no-op if one is already
    /// running.
    pub async fn start_heartbeat(self: &Arc<Self>, interval: Duration) {
        let mut handle_slot = self.heartbeat_handle.lock().await;
        if handle_slot.is_some() {
            warn!("heartbeat already running");
            return;
        }
        let bridge = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let time_since_tick = bridge.last_tick.lock().await.elapsed();
                let status = if time_since_tick > bridge.stall_threshold {
                    warn!(elapsed_s = time_since_tick.as_secs_f64(), "system stalled");
                    "stalled"
                } else {
                    "alive"
                };
                bridge
                    .broadcast(
                        "SYSTEM_HEARTBEAT",
                        "system",
                        serde_json::json!({
                            "status": status,
                            "uptime_s": bridge.uptime().as_secs_f64(),
                            "last_tick_delta_s": time_since_tick.as_secs_f64(),
                        }),
                    )
                    .await;
            }
        });
        *handle_slot = Some(handle);
        info!(interval_s = interval.as_secs_f64(), "UI heartbeat started");
    }

    pub async fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat_handle.lock().await.take() {
            handle.abort();
            info!("UI heartbeat stopped");
        }
    }
}

#[must_use]
pub fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct CountingTransport(Arc<AtomicUsize>);

    #[async_trait]
    impl UiTransport for CountingTransport {
        async fn send(&self, _frame: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct DeadTransport;

    #[async_trait]
    impl UiTransport for DeadTransport {
        async fn send(&self, _frame: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn broken_transport_is_dropped_after_one_failed_send() {
        let bridge = UiBridge::default();
        bridge.register_transport("dead", Box::new(DeadTransport)).await;
        bridge.broadcast("PING", "system", serde_json::json!({})).await;
        assert!(bridge.transports.read().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_live_transport() {
        let bridge = UiBridge::default();
        let count = Arc::new(AtomicUsize::new(0));
        bridge
            .register_transport("a", Box::new(CountingTransport(Arc::clone(&count))))
            .await;
        bridge
            .register_transport("b", Box::new(CountingTransport(Arc::clone(&count))))
            .await;
        bridge.broadcast("PING", "system", serde_json::json!({})).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
