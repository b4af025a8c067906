use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    Sunny,
    Overcast,
    Rain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStage {
    Seedling,
    Vegetative,
    Flowering,
    Fruiting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvState {
    pub sim_day: u32,
    pub sim_hour: f64,
    pub weather: Weather,
    pub outside_temp: f64,
}

impl Default for EnvState {
    fn default() -> Self {
        Self {
            sim_day: 1,
            sim_hour: 8.0,
            weather: Weather::Sunny,
            outside_temp: 18.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropState {
    pub plant_id: String,
    pub stage: CropStage,
    pub day_planted: u32,
    pub days_in_stage: u32,
}

impl Default for CropState {
    fn default() -> Self {
        Self {
            plant_id: "crop-001".to_string(),
            stage: CropStage::Seedling,
            day_planted: 1,
            days_in_stage: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Opex {
    pub electricity_kwh: f64,
    pub nutrients_l: f64,
    pub utility_cost: f64,
    pub labor_saved_h: f64,
}

/// Whether the most recent write to an actuator came from the user (via
/// CommandPlane/HTTP) or from an agent. `None` means no override is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideSource {
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActuatorValue {
    Bool(bool),
    Scalar(f64),
}

impl ActuatorValue {
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Scalar(s) => *s > 0.0,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Scalar(s) => *s,
        }
    }
}

/// The authoritative simulated ground truth. Exclusively owned by `Twin`;
/// every other component sees only `snapshot()`/`telemetry_packet()` copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwinState {
    pub sensors: BTreeMap<String, f64>,
    pub actuators: BTreeMap<String, ActuatorValue>,
    pub overrides: BTreeMap<String, OverrideSource>,
    pub env: EnvState,
    pub crop: CropState,
    pub opex: Opex,
    pub stress_index: f64,
    pub plant_health: f64,
    pub sim_time_secs: f64,
    pub cycle_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_ACTUATORS: &[(&str, ActuatorValue)] = &[
    ("pump_active", ActuatorValue::Bool(false)),
    ("heater", ActuatorValue::Bool(false)),
    ("vent", ActuatorValue::Scalar(0.0)),
    ("fan", ActuatorValue::Bool(false)),
    ("nutrient_pump", ActuatorValue::Bool(false)),
    ("grow_light", ActuatorValue::Bool(false)),
    ("ph_up_pump", ActuatorValue::Bool(false)),
    ("ph_down_pump", ActuatorValue::Bool(false)),
];

pub const DEFAULT_SENSORS: &[(&str, f64)] = &[
    ("temperature", 22.0),
    ("humidity", 45.0),
    ("ph_level", 6.5),
    ("ec_level", 1.5),
    ("lux", 0.0),
    ("co2", 400.0),
    ("water_pressure", 0.0),
    ("dissolved_o2", 6.5),
];

impl Default for TwinState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            sensors: DEFAULT_SENSORS
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
            actuators: DEFAULT_ACTUATORS
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
            overrides: BTreeMap::new(),
            env: EnvState::default(),
            crop: CropState::default(),
            opex: Opex::default(),
            stress_index: 0.0,
            plant_health: 1.0,
            sim_time_secs: 0.0,
            cycle_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Bounds the Twin never produces values outside of (§3 invariants). Hardware
/// readings outside these ranges are the Watchdog's concern, not the Twin's.
pub const SENSOR_PLAUSIBLE_RANGES: &[(&str, f64, f64)] = &[
    ("temperature", -20.0, 80.0),
    ("humidity", 0.0, 100.0),
    ("ph_level", 0.0, 14.0),
    ("co2", 0.0, 5000.0),
    ("water_pressure", 0.0, 200.0),
    ("dissolved_o2", 0.0, 20.0),
];

/// A rounded, UI-oriented snapshot (§4.1 `telemetry_packet`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPacket {
    pub temperature: f64,
    pub humidity: f64,
    pub ph_level: f64,
    pub ec_level: f64,
    pub lux: f64,
    pub co2: f64,
    pub water_pressure: f64,
    pub dissolved_o2: f64,
    pub pump_active: bool,
    pub plant_health: f64,
    pub stress_index: f64,
    pub electricity_kwh: f64,
    pub sim_day: u32,
    pub sim_hour: f64,
    pub weather: Weather,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl TwinState {
    #[must_use]
    pub fn telemetry_packet(&self) -> TelemetryPacket {
        let sensor = |id: &str| self.sensors.get(id).copied().unwrap_or(0.0);
        TelemetryPacket {
            temperature: round2(sensor("temperature")),
            humidity: round2(sensor("humidity")),
            ph_level: round2(sensor("ph_level")),
            ec_level: round2(sensor("ec_level")),
            lux: round2(sensor("lux")),
            co2: round2(sensor("co2")),
            water_pressure: round2(sensor("water_pressure")),
            dissolved_o2: round2(sensor("dissolved_o2")),
            pump_active: self
                .actuators
                .get("pump_active")
                .is_some_and(ActuatorValue::as_bool),
            plant_health: round2(self.plant_health),
            stress_index: round2(self.stress_index),
            electricity_kwh: (self.opex.electricity_kwh * 1000.0).round() / 1000.0,
            sim_day: self.env.sim_day,
            sim_hour: round2(self.env.sim_hour),
            weather: self.env.weather,
        }
    }
}
