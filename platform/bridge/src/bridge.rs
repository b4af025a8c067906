//! Mediates between the Twin (or real hardware) and the rest of the system
//! (§4.5). Grounded on the legacy bridge's connect/write_setpoint/stream
//! sequence, generalized from a single global instance into an owned,
//! dependency-injected struct.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use greenhouse_config::constants;
use greenhouse_core::{ActuatorValue, Bus, Message, SafetyWatchdog, Twin, WriteSource, saturation_vapor_pressure_kpa};
use greenhouse_ui::UiBridge;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, instrument, warn};

use crate::transport::HardwareTransport;

const TELEMETRY_TOPIC: &str = "telemetry/industrial";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Sim,
    Hardware,
}

struct BridgeState {
    mode: BridgeMode,
    connected: bool,
}

pub struct IndustrialBridge {
    twin: Arc<Twin>,
    watchdog: Arc<SafetyWatchdog>,
    bus: Arc<Bus>,
    ui: Arc<UiBridge>,
    transport: Arc<dyn HardwareTransport>,
    state: Mutex<BridgeState>,
    sample_buffer: Mutex<VecDeque<BTreeMap<String, f64>>>,
    consecutive_failures: AtomicU32,
    streaming: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IndustrialBridge {
    #[must_use]
    pub fn new(
        twin: Arc<Twin>,
        watchdog: Arc<SafetyWatchdog>,
        bus: Arc<Bus>,
        ui: Arc<UiBridge>,
        transport: Arc<dyn HardwareTransport>,
    ) -> Self {
        Self {
            twin,
            watchdog,
            bus,
            ui,
            transport,
            state: Mutex::new(BridgeState { mode: BridgeMode::Sim, connected: false }),
            sample_buffer: Mutex::new(VecDeque::new()),
            consecutive_failures: AtomicU32::new(0),
            streaming: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Idempotent: a second `connect` call while already connected is a
    /// no-op, regardless of the mode requested.
    #[instrument(skip(self))]
    pub async fn connect(self: &Arc<Self>, requested: BridgeMode) {
        let mut state = self.state.lock().await;
        if state.connected {
            return;
        }

        state.mode = match requested {
            BridgeMode::Hardware => {
                if self.transport.connect().await {
                    BridgeMode::Hardware
                } else {
                    warn!("failed to connect to hardware, reverting to simulation mode");
                    BridgeMode::Sim
                }
            }
            BridgeMode::Sim => BridgeMode::Sim,
        };
        state.connected = true;
        let mode = state.mode;
        drop(state);

        self.streaming.store(true, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        if mode == BridgeMode::Hardware {
            tasks.push(self.spawn_sampling_loop());
        }
        tasks.push(self.spawn_telemetry_loop());
        info!(?mode, "industrial bridge connected");
    }

    /// §4.5 `write_setpoint`: connected, then watchdog, then the actual
    /// write; failure at any step returns `false` without a side effect.
    #[instrument(skip(self, value))]
    pub async fn write_setpoint(&self, actuator_id: &str, value: ActuatorValue, source: WriteSource) -> bool {
        if !self.state.lock().await.connected {
            warn!(actuator = actuator_id, "bridge not connected, refusing write");
            return false;
        }

        let snapshot = self.twin.snapshot();
        let is_active = |id: &str| {
            snapshot.actuators.get(id).copied().map(|v| v.as_bool()).unwrap_or(false)
        };
        if !self.watchdog.validate_write(actuator_id, is_active) {
            warn!(actuator = actuator_id, "write rejected by safety watchdog");
            return false;
        }

        let mode = self.state.lock().await.mode;
        let ok = match mode {
            BridgeMode::Hardware => self.transport.write_actuator(actuator_id, value).await,
            BridgeMode::Sim => self.twin.set_actuator(actuator_id, value, source),
        };
        if ok {
            info!(actuator = actuator_id, ?value, "setpoint written");
        } else {
            warn!(actuator = actuator_id, "setpoint write failed");
        }
        ok
    }

    fn spawn_sampling_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(constants::DEFAULT_SAMPLE_INTERVAL_MILLIS));
            let capacity = (constants::SAMPLE_BUFFER_SECS * 1000 / constants::DEFAULT_SAMPLE_INTERVAL_MILLIS) as usize;
            while bridge.streaming.load(Ordering::SeqCst) {
                ticker.tick().await;
                match bridge.transport.sample().await {
                    Ok(sample) => {
                        bridge.consecutive_failures.store(0, Ordering::SeqCst);
                        bridge.watchdog.check_telemetry(&sample);
                        let mut buffer = bridge.sample_buffer.lock().await;
                        if buffer.len() >= capacity {
                            buffer.pop_front();
                        }
                        buffer.push_back(sample);
                    }
                    Err(err) => {
                        let failures = bridge.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                        warn!(error = %err, failures, "hardware sample failed");
                        if failures >= constants::MAX_CONSECUTIVE_TELEMETRY_FAILURES {
                            warn!("consecutive sample failures exceeded threshold, triggering emergency stop");
                            bridge.watchdog.trigger_emergency_stop();
                        }
                    }
                }
            }
        })
    }

    fn spawn_telemetry_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
                constants::DEFAULT_TELEMETRY_PUBLISH_MILLIS,
            ));
            while bridge.streaming.load(Ordering::SeqCst) {
                ticker.tick().await;
                bridge.publish_telemetry_frame().await;
            }
        })
    }

    async fn publish_telemetry_frame(&self) {
        let packet = self.twin.telemetry_packet();
        let vpd = vapor_pressure_deficit(packet.temperature, packet.humidity);
        let noise_stddev = self.rolling_noise_stddev("temperature").await;

        let frame = serde_json::json!({
            "raw": packet,
            "latent": {
                "vpd_kpa": vpd,
                "temperature_noise_stddev": noise_stddev,
            },
        });

        if let Ok(message) = Message::event("industrial-bridge", "*", frame.clone()) {
            self.bus.publish(TELEMETRY_TOPIC, message).await;
        }
        self.ui.broadcast("GREENHOUSE_TELEMETRY", "industrial-bridge", frame).await;
    }

    async fn rolling_noise_stddev(&self, sensor_id: &str) -> Option<f64> {
        let buffer = self.sample_buffer.lock().await;
        if buffer.len() < 2 {
            return None;
        }
        let values: Vec<f64> = buffer.iter().filter_map(|frame| frame.get(sensor_id).copied()).collect();
        if values.len() < 2 {
            return None;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        Some(variance.sqrt())
    }

    pub async fn disconnect(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.transport.disconnect().await;
        self.state.lock().await.connected = false;
        info!("industrial bridge disconnected");
    }

    #[must_use]
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }
}

/// VPD = SVP(T) − SVP(T)·RH/100 (§4.5).
#[must_use]
pub fn vapor_pressure_deficit(temp_c: f64, relative_humidity_pct: f64) -> f64 {
    let svp = saturation_vapor_pressure_kpa(temp_c);
    svp - svp * relative_humidity_pct / 100.0
}

#[cfg(test)]
mod tests {
    use greenhouse_core::Twin;

    use super::*;
    use crate::transport::NullHardwareTransport;

    fn make_bridge() -> Arc<IndustrialBridge> {
        Arc::new(IndustrialBridge::new(
            Arc::new(Twin::with_seed(60.0, 3)),
            Arc::new(SafetyWatchdog::default()),
            Arc::new(Bus::default()),
            Arc::new(UiBridge::default()),
            Arc::new(NullHardwareTransport),
        ))
    }

    #[tokio::test]
    async fn hardware_connect_failure_falls_back_to_sim() {
        let bridge = make_bridge();
        bridge.connect(BridgeMode::Hardware).await;
        assert_eq!(bridge.state.lock().await.mode, BridgeMode::Sim);
        bridge.disconnect().await;
    }

    #[tokio::test]
    async fn write_setpoint_requires_connection_first() {
        let bridge = make_bridge();
        assert!(!bridge.write_setpoint("pump_active", ActuatorValue::Bool(true), WriteSource::Agent).await);
        bridge.connect(BridgeMode::Sim).await;
        assert!(bridge.write_setpoint("pump_active", ActuatorValue::Bool(true), WriteSource::Agent).await);
        bridge.disconnect().await;
    }

    #[test]
    fn vpd_is_zero_at_full_saturation() {
        assert!(vapor_pressure_deficit(25.0, 100.0).abs() < 1e-9);
    }
}
