//! Composition root: wires every platform crate into one running system
//! (§10.3). `Runtime::build` constructs the whole dependency graph without
//! starting anything; `Runtime::run` starts every background loop and
//! blocks until shutdown.

pub mod agents;
pub mod bus_listener;
pub mod event_log;
pub mod http;
pub mod settings;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use greenhouse_bridge::{BridgeMode, IndustrialBridge, NullHardwareTransport};
use greenhouse_config::{RuntimeConfig, constants};
use greenhouse_core::{Agent, AgentRuntime, Bus, FinanceTracker, SafetyWatchdog, Twin};
use greenhouse_orchestrator::{Orchestrator, validation_chain};
use greenhouse_ui::{CommandPlane, StdoutTransport, UiBridge, default_heartbeat_interval};
use thiserror::Error;
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
};
use tracing::info;

use crate::agents::{ClimateAgent, StubAgent, SupervisorAgent};
use crate::event_log::EventLogTransport;
use crate::http::AppState;
use crate::settings::SettingsStore;

const PIPELINE_ROLES: &[(&str, &str)] =
    &[("coder_01", "coder"), ("tester_01", "tester"), ("documenter_01", "documenter"), ("validator_01", "validator")];

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to prepare scratch directory {path}: {source}")]
    ScratchDir { path: String, #[source] source: std::io::Error },

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    HttpBind { addr: std::net::SocketAddr, #[source] source: std::io::Error },

    #[error(transparent)]
    Http(#[from] std::io::Error),
}

/// Every long-lived component, owned by `Arc` so handlers, background tasks,
/// and the HTTP layer can all hold a reference.
pub struct Runtime {
    config: RuntimeConfig,
    pub agents: Arc<AgentRuntime>,
    pub twin: Arc<Twin>,
    pub bus: Arc<Bus>,
    pub watchdog: Arc<SafetyWatchdog>,
    pub ui: Arc<UiBridge>,
    pub bridge: Arc<IndustrialBridge>,
    pub finance: Arc<Mutex<FinanceTracker>>,
    pub orchestrator: Arc<Orchestrator>,
    pub command_plane: Arc<CommandPlane>,
    pub settings: Arc<SettingsStore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_notify: Notify,
}

impl Runtime {
    /// Constructs the full dependency graph and registers the built-in
    /// pipeline roles' mailboxes, but starts no background task.
    pub async fn build(config: RuntimeConfig) -> Result<Arc<Self>, RuntimeError> {
        let scratch_root = config.settings_path.parent().unwrap_or_else(|| std::path::Path::new(".")).join("agent-scratch");
        tokio::fs::create_dir_all(&scratch_root).await.map_err(|source| RuntimeError::ScratchDir {
            path: scratch_root.display().to_string(),
            source,
        })?;

        let bus = Arc::new(Bus::default());
        let agents = Arc::new(AgentRuntime::new(scratch_root, Arc::clone(&bus)));
        let twin = Arc::new(Twin::new(config.time_acceleration));
        let watchdog = Arc::new(SafetyWatchdog::default());
        let ui = Arc::new(UiBridge::default());
        let finance = Arc::new(Mutex::new(FinanceTracker::new()));
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&ui), Arc::clone(&finance), config.budget));
        orchestrator
            .register_workflow(validation_chain(Arc::clone(&bus), Arc::clone(&finance), Arc::clone(&ui)))
            .await;

        let bridge = Arc::new(IndustrialBridge::new(
            Arc::clone(&twin),
            Arc::clone(&watchdog),
            Arc::clone(&bus),
            Arc::clone(&ui),
            Arc::new(NullHardwareTransport),
        ));

        let command_plane = Arc::new(CommandPlane::new(
            Arc::clone(&agents),
            Arc::clone(&twin),
            Arc::clone(&bus),
            Arc::clone(&ui),
            Arc::clone(&watchdog),
        ));
        let settings = Arc::new(SettingsStore::new(config.settings_path.clone()));

        for (id, _role) in PIPELINE_ROLES {
            bus.register_agent(*id).await;
        }
        bus.register_agent("supervisor_01").await;
        bus.register_agent("climate_01").await;

        Ok(Arc::new(Self {
            config,
            agents,
            twin,
            bus,
            watchdog,
            ui,
            bridge,
            finance,
            orchestrator,
            command_plane,
            settings,
            tasks: Mutex::new(Vec::new()),
            shutdown_notify: Notify::new(),
        }))
    }

    /// Starts every background loop (Twin step, Bridge sampling/telemetry,
    /// UI heartbeat, pipeline-role listeners, climate reactor) and, if
    /// configured, an HTTP/WebSocket server. Blocks until shutdown.
    pub async fn run(self: &Arc<Self>) -> Result<(), RuntimeError> {
        self.ui.register_transport("stdout", Box::new(StdoutTransport)).await;
        self.ui
            .register_transport("event_log", Box::new(EventLogTransport::new(self.config.event_log_path.clone())))
            .await;

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(spawn_twin_loop(Arc::clone(&self.twin)));
            tasks.extend(self.spawn_pipeline_listeners());
            tasks.push(crate::agents::climate::spawn_reactive_loop(Arc::clone(&self.bus), Arc::clone(&self.bridge)));
        }

        let mode = if self.config.hardware_endpoint.is_some() { BridgeMode::Hardware } else { BridgeMode::Sim };
        self.bridge.connect(mode).await;
        self.ui.start_heartbeat(default_heartbeat_interval()).await;

        let runtime = Arc::clone(self);
        self.command_plane
            .set_shutdown_callback(Arc::new(move || {
                let runtime = Arc::clone(&runtime);
                Box::pin(async move { runtime.shutdown().await })
            }))
            .await;

        info!("greenhouse runtime started");

        if let Some(addr) = self.config.bind_addr {
            let state = Arc::new(AppState {
                agents: Arc::clone(&self.agents),
                twin: Arc::clone(&self.twin),
                bus: Arc::clone(&self.bus),
                ui: Arc::clone(&self.ui),
                watchdog: Arc::clone(&self.watchdog),
                command_plane: Arc::clone(&self.command_plane),
                settings: Arc::clone(&self.settings),
                started_at: Instant::now(),
            });
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|source| RuntimeError::HttpBind { addr, source })?;
            info!(%addr, "HTTP/WebSocket server listening");
            let server = axum::serve(listener, crate::http::router(state));

            tokio::select! {
                result = server => { result?; }
                () = self.shutdown_notify.notified() => {}
            }
        } else {
            self.shutdown_notify.notified().await;
        }

        Ok(())
    }

    fn spawn_pipeline_listeners(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for (id, role) in PIPELINE_ROLES {
            let handler: Arc<dyn Agent> = Arc::new(StubAgent::new(role));
            handles.push(bus_listener::spawn_listener(Arc::clone(&self.bus), (*id).to_string(), handler));
        }
        let supervisor: Arc<dyn Agent> = Arc::new(SupervisorAgent::new(Arc::clone(&self.orchestrator)));
        handles.push(bus_listener::spawn_listener(Arc::clone(&self.bus), "supervisor_01".to_string(), supervisor));
        let climate: Arc<dyn Agent> = Arc::new(ClimateAgent);
        handles.push(bus_listener::spawn_listener(Arc::clone(&self.bus), "climate_01".to_string(), climate));
        handles
    }

    /// CLI goal ingress (argv mode): starts just enough to run one
    /// `validation_chain` execution, then tears the listeners back down.
    /// Never starts the Bridge, heartbeat, or HTTP server.
    pub async fn run_cli_goal(
        self: &Arc<Self>,
        goal: String,
    ) -> Result<greenhouse_orchestrator::WorkflowState, greenhouse_core::CoreError> {
        let listeners = self.spawn_pipeline_listeners();
        let mut initial_data = std::collections::BTreeMap::new();
        initial_data.insert("goal".to_string(), serde_json::Value::String(goal));
        let result = self.orchestrator.execute("validation_chain", initial_data).await;
        for listener in listeners {
            listener.abort();
        }
        result
    }

    /// Idempotent from the caller's perspective (`CommandPlane` only ever
    /// invokes this once): stops accepting new commands by unwinding every
    /// background task, in the order §5 documents.
    pub async fn shutdown(&self) {
        info!("greenhouse runtime shutting down");
        for record in self.agents.list_all().await {
            self.agents.kill(&record.id).await;
        }
        self.bridge.disconnect().await;
        self.ui.stop_heartbeat().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.shutdown_notify.notify_waiters();
    }
}

fn spawn_twin_loop(twin: Arc<Twin>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(constants::DEFAULT_TWIN_TICK_MILLIS));
        let mut last = Instant::now();
        loop {
            ticker.tick().await;
            let now = Instant::now();
            twin.step(now.duration_since(last).as_secs_f64());
            last = now;
        }
    })
}
