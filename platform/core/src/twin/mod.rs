//! Digital-twin state machine: physics step plus priority-arbitrated
//! actuator writes (§4.1). Grounded on the simulation's exponential-smoothing
//! physics step and the spec's richer `source`-aware override model.

mod physics;
mod state;

use std::sync::Mutex;

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info, instrument, warn};

pub use physics::saturation_vapor_pressure_kpa;
pub use state::{
    ActuatorValue, CropStage, EnvState, OverrideSource, SENSOR_PLAUSIBLE_RANGES, TelemetryPacket,
    TwinState, Weather,
};

/// Who issued an actuator write. Agent writes defer to an active user
/// override; user writes always win and set the override (§4.1 rule 2-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Agent,
    User,
}

pub struct Twin {
    state: Mutex<TwinState>,
    rng: Mutex<StdRng>,
    time_acceleration: f64,
}

impl Twin {
    #[must_use]
    pub fn new(time_acceleration: f64) -> Self {
        Self {
            state: Mutex::new(TwinState::default()),
            rng: Mutex::new(StdRng::from_entropy()),
            time_acceleration,
        }
    }

    /// Deterministic constructor for tests (property #6).
    #[must_use]
    pub fn with_seed(time_acceleration: f64, seed: u64) -> Self {
        Self {
            state: Mutex::new(TwinState::default()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            time_acceleration,
        }
    }

    /// Synchronous and non-suspending by contract (§5): holds the state
    /// mutex for the whole step, never awaits.
    #[instrument(skip(self))]
    pub fn step(&self, delta_secs: f64) {
        let mut state = self.state.lock().expect("twin state mutex poisoned");
        let mut rng = self.rng.lock().expect("twin rng mutex poisoned");
        physics::step(&mut state, delta_secs, self.time_acceleration, &mut *rng);
        if state.cycle_count % 60 == 0 {
            info!(
                temperature = state.sensors.get("temperature").copied().unwrap_or(0.0),
                ph = state.sensors.get("ph_level").copied().unwrap_or(0.0),
                electricity_kwh = state.opex.electricity_kwh,
                "twin tick"
            );
        } else {
            debug!(cycle = state.cycle_count, "twin tick");
        }
    }

    /// §4.1 `set_actuator`. Returns `false` without mutating state whenever
    /// the write is rejected — never as an error (failure semantics).
    #[instrument(skip(self, value))]
    pub fn set_actuator(&self, id: &str, value: ActuatorValue, source: WriteSource) -> bool {
        let mut state = self.state.lock().expect("twin state mutex poisoned");
        if !state.actuators.contains_key(id) {
            warn!(actuator = id, "unknown actuator id");
            return false;
        }
        match source {
            WriteSource::User => {
                state.actuators.insert(id.to_string(), value);
                state.overrides.insert(id.to_string(), OverrideSource::User);
                state.updated_at = chrono::Utc::now();
                true
            }
            WriteSource::Agent => {
                if state.overrides.contains_key(id) {
                    debug!(actuator = id, "agent write rejected by active override");
                    return false;
                }
                state.actuators.insert(id.to_string(), value);
                state.updated_at = chrono::Utc::now();
                true
            }
        }
    }

    pub fn clear_override(&self, id: &str) {
        let mut state = self.state.lock().expect("twin state mutex poisoned");
        state.overrides.remove(id);
    }

    pub fn clear_all_overrides(&self) {
        let mut state = self.state.lock().expect("twin state mutex poisoned");
        state.overrides.clear();
    }

    #[must_use]
    pub fn is_overridden(&self, id: &str) -> bool {
        self.state
            .lock()
            .expect("twin state mutex poisoned")
            .overrides
            .contains_key(id)
    }

    #[must_use]
    pub fn override_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("twin state mutex poisoned")
            .overrides
            .keys()
            .cloned()
            .collect()
    }

    /// An immutable copy of the observable state, suitable for broadcast.
    #[must_use]
    pub fn snapshot(&self) -> TwinState {
        self.state.lock().expect("twin state mutex poisoned").clone()
    }

    #[must_use]
    pub fn telemetry_packet(&self) -> TelemetryPacket {
        self.state
            .lock()
            .expect("twin state mutex poisoned")
            .telemetry_packet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_write_always_wins_then_clears() {
        let twin = Twin::with_seed(60.0, 1);
        assert!(twin.set_actuator("pump_active", ActuatorValue::Bool(true), WriteSource::Agent));
        assert!(twin.set_actuator(
            "pump_active",
            ActuatorValue::Bool(false),
            WriteSource::User
        ));
        assert!(twin.is_overridden("pump_active"));
        assert!(!twin.set_actuator(
            "pump_active",
            ActuatorValue::Bool(true),
            WriteSource::Agent
        ));
        assert_eq!(
            twin.snapshot().actuators["pump_active"],
            ActuatorValue::Bool(false)
        );
        twin.clear_override("pump_active");
        assert!(!twin.is_overridden("pump_active"));
        assert!(twin.set_actuator("pump_active", ActuatorValue::Bool(true), WriteSource::Agent));
        assert_eq!(
            twin.snapshot().actuators["pump_active"],
            ActuatorValue::Bool(true)
        );
    }

    #[test]
    fn unknown_actuator_rejected() {
        let twin = Twin::with_seed(60.0, 2);
        assert!(!twin.set_actuator("not_real", ActuatorValue::Bool(true), WriteSource::User));
    }
}
