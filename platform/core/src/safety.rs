//! Authoritative gate over actuator writes and telemetry sanity (§4.2).
//! Grounded on the legacy watchdog's hardcoded sensor ranges and
//! never-auto-clears emergency lock.

use std::{
    collections::BTreeMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::{error, warn};

/// Default safe ranges, matching the values the legacy watchdog hardcoded.
pub const DEFAULT_RANGES: &[(&str, f64, f64)] = &[
    ("S02_TEMP", 10.0, 45.0),
    ("S03_HUM", 10.0, 95.0),
    ("S04_PH", 4.0, 9.0),
];

/// Actuator pairs that must never be simultaneously active, independent of
/// the emergency lock (§4.2: "policy decision, stated as a table").
pub const DEFAULT_CONFLICTS: &[(&str, &str)] = &[("ph_up_pump", "ph_down_pump")];

struct WatchdogState {
    ranges: BTreeMap<String, (f64, f64)>,
    timeout: Duration,
    emergency_lock: bool,
    last_sensor_update: Option<Instant>,
}

pub struct SafetyWatchdog {
    state: Mutex<WatchdogState>,
    conflicts: Vec<(String, String)>,
}

impl Default for SafetyWatchdog {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl SafetyWatchdog {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(WatchdogState {
                ranges: DEFAULT_RANGES
                    .iter()
                    .map(|(id, lo, hi)| ((*id).to_string(), (*lo, *hi)))
                    .collect(),
                timeout,
                emergency_lock: false,
                last_sensor_update: None,
            }),
            conflicts: DEFAULT_CONFLICTS
                .iter()
                .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
                .collect(),
        }
    }

    pub fn set_range(&self, sensor_id: impl Into<String>, min: f64, max: f64) {
        let mut state = self.state.lock().expect("watchdog mutex poisoned");
        state.ranges.insert(sensor_id.into(), (min, max));
    }

    /// §4.2 `validate_write`. `is_active` resolves whether a given actuator
    /// is currently on, used to enforce the conflict table.
    pub fn validate_write(
        &self,
        actuator_id: &str,
        is_active: impl Fn(&str) -> bool,
    ) -> bool {
        let state = self.state.lock().expect("watchdog mutex poisoned");
        if state.emergency_lock {
            return false;
        }
        drop(state);
        for (a, b) in &self.conflicts {
            if (a == actuator_id && is_active(b)) || (b == actuator_id && is_active(a)) {
                warn!(actuator = actuator_id, conflict_with = %if a == actuator_id { b } else { a }, "conflicting actuator pair rejected");
                return false;
            }
        }
        true
    }

    /// §4.2 `check_telemetry`: latches on out-of-range values or stale
    /// updates; always advances `last_sensor_update`.
    pub fn check_telemetry(&self, sensors: &BTreeMap<String, f64>) {
        let mut state = self.state.lock().expect("watchdog mutex poisoned");
        let mut should_latch = false;

        for (id, (min, max)) in &state.ranges {
            if let Some(&value) = sensors.get(id) {
                if value < *min || value > *max {
                    error!(sensor = id, value, min, max, "sensor reading out of range");
                    should_latch = true;
                }
            }
        }

        if let Some(last) = state.last_sensor_update {
            if last.elapsed() > state.timeout {
                error!("sensor telemetry stale, exceeding watchdog timeout");
                should_latch = true;
            }
        }

        state.last_sensor_update = Some(Instant::now());
        if should_latch {
            state.emergency_lock = true;
        }
    }

    /// §4.2 `trigger_emergency_stop`: unconditional latch.
    pub fn trigger_emergency_stop(&self) {
        let mut state = self.state.lock().expect("watchdog mutex poisoned");
        if !state.emergency_lock {
            error!("emergency stop triggered");
        }
        state.emergency_lock = true;
    }

    /// Operator-only reset. Not reachable from agent or UI command paths.
    pub fn reset(&self, _authorization_token: &str) {
        let mut state = self.state.lock().expect("watchdog mutex poisoned");
        state.emergency_lock = false;
    }

    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.state.lock().expect("watchdog mutex poisoned").emergency_lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_idempotent_until_reset() {
        let watchdog = SafetyWatchdog::default();
        let mut sensors = BTreeMap::new();
        sensors.insert("S02_TEMP".to_string(), 50.0);
        watchdog.check_telemetry(&sensors);
        assert!(watchdog.is_latched());

        sensors.insert("S02_TEMP".to_string(), 20.0);
        watchdog.check_telemetry(&sensors);
        assert!(watchdog.is_latched(), "an in-range reading must not clear the latch");

        assert!(!watchdog.validate_write("pump_active", |_| false));
        watchdog.reset("operator-token");
        assert!(!watchdog.is_latched());
        assert!(watchdog.validate_write("pump_active", |_| false));
    }

    #[test]
    fn conflict_table_blocks_simultaneous_pair() {
        let watchdog = SafetyWatchdog::default();
        assert!(!watchdog.validate_write("ph_up_pump", |id| id == "ph_down_pump"));
    }
}
