//! Physics step equations, factored out of `Twin::step` so the pure math can
//! be unit-tested without going through the mutex-guarded state machine.

use rand::Rng;

use super::state::{ActuatorValue, TwinState, Weather};

const TEMP_BASE: f64 = 20.0;
const TEMP_AMPLITUDE: f64 = 5.0;
const CYCLE_HOURS: f64 = 24.0;

const HEATER_KW: f64 = 1.5;
const FAN_KW: f64 = 0.2;
const PUMP_KW: f64 = 0.1;
const GROW_LIGHT_KW: f64 = 0.4;
const ELECTRICITY_RATE: f64 = 0.12;

/// Saturation vapor pressure (kPa) per the Magnus-Tetens approximation,
/// used to derive VPD in the bridge and referenced here for documentation
/// parity only (the Twin does not itself compute VPD — that is a bridge-side
/// latent variable derived from the telemetry snapshot).
#[must_use]
pub fn saturation_vapor_pressure_kpa(temp_c: f64) -> f64 {
    0.61078 * ((17.27 * temp_c) / (temp_c + 237.3)).exp()
}

fn actuator_on(state: &TwinState, id: &str) -> bool {
    state
        .actuators
        .get(id)
        .is_some_and(ActuatorValue::as_bool)
}

fn vent_fraction(state: &TwinState) -> f64 {
    state.actuators.get("vent").map_or(0.0, ActuatorValue::as_f64)
}

fn finite_or_keep(candidate: f64, previous: f64) -> f64 {
    if candidate.is_finite() {
        candidate
    } else {
        previous
    }
}

/// Advances `state` by `delta_secs` of simulated time. Never panics; any
/// factor computation that would go non-finite is skipped in favor of the
/// previous value (§4.1 failure semantics).
pub fn step(state: &mut TwinState, delta_secs: f64, time_acceleration: f64, rng: &mut impl Rng) {
    let delta_secs = delta_secs.max(0.0);
    state.sim_time_secs += delta_secs;
    state.cycle_count += 1;

    let sim_hours_elapsed = delta_secs * time_acceleration / 3600.0;
    let mut sim_hour = state.env.sim_hour + sim_hours_elapsed;
    while sim_hour >= CYCLE_HOURS {
        sim_hour -= CYCLE_HOURS;
        state.env.sim_day += 1;
        state.env.weather = roll_weather(rng);
    }
    state.env.sim_hour = sim_hour;

    let phase = (state.env.sim_hour / CYCLE_HOURS) * std::f64::consts::TAU;
    let weather_temp_offset = match state.env.weather {
        Weather::Sunny => 1.0,
        Weather::Overcast => -0.5,
        Weather::Rain => -2.0,
    };

    step_temperature(state, phase, weather_temp_offset, rng);
    step_humidity(state, phase, rng);
    step_lux(state, phase);
    step_ph(state, rng);
    step_ec(state, delta_secs);
    step_water_pressure(state);
    step_co2(state);
    step_dissolved_o2(state, delta_secs);

    accumulate_opex(state, delta_secs);
    update_stress_and_health(state, delta_secs);

    state.updated_at = chrono::Utc::now();
}

fn roll_weather(rng: &mut impl Rng) -> Weather {
    match rng.gen_range(0..3) {
        0 => Weather::Sunny,
        1 => Weather::Overcast,
        _ => Weather::Rain,
    }
}

fn step_temperature(state: &mut TwinState, phase: f64, weather_offset: f64, rng: &mut impl Rng) {
    let prev = state.sensors.get("temperature").copied().unwrap_or(TEMP_BASE);
    let mut t = TEMP_BASE + TEMP_AMPLITUDE * phase.sin() + weather_offset;
    t += (state.env.outside_temp - TEMP_BASE) * 0.1;
    if actuator_on(state, "heater") {
        t += 2.0;
    }
    let vent = vent_fraction(state);
    if vent > 0.0 {
        t -= vent * 3.0;
    }
    t += rng.gen_range(-0.1..0.1);
    state.sensors.insert("temperature".to_string(), finite_or_keep(t, prev));
}

fn step_humidity(state: &mut TwinState, phase: f64, rng: &mut impl Rng) {
    let prev = state.sensors.get("humidity").copied().unwrap_or(50.0);
    let weather_offset = match state.env.weather {
        Weather::Sunny => -3.0,
        Weather::Overcast => 2.0,
        Weather::Rain => 8.0,
    };
    let h = 50.0 + 10.0 * phase.cos() + weather_offset + rng.gen_range(-0.5..0.5);
    state
        .sensors
        .insert("humidity".to_string(), finite_or_keep(h, prev).clamp(20.0, 95.0));
}

fn step_lux(state: &mut TwinState, phase: f64) {
    let daylight = phase.sin().max(0.0);
    let weather_scale = match state.env.weather {
        Weather::Sunny => 1.0,
        Weather::Overcast => 0.5,
        Weather::Rain => 0.25,
    };
    let mut lux = daylight * 40_000.0 * weather_scale;
    if actuator_on(state, "grow_light") {
        lux += 8_000.0;
    }
    state.sensors.insert("lux".to_string(), lux.max(0.0));
}

fn step_ph(state: &mut TwinState, rng: &mut impl Rng) {
    let prev = state.sensors.get("ph_level").copied().unwrap_or(6.5);
    let ph_up = actuator_on(state, "ph_up_pump");
    let ph_down = actuator_on(state, "ph_down_pump");
    let dosing = actuator_on(state, "pump_active") || actuator_on(state, "nutrient_pump");
    let next = if ph_up {
        (prev + rng.gen_range(0.02..0.08)).min(8.5)
    } else if ph_down {
        (prev - rng.gen_range(0.02..0.08)).max(4.0)
    } else if dosing {
        (prev + rng.gen_range(0.0..0.05)).min(8.5)
    } else {
        (prev - rng.gen_range(0.0..0.01)).max(4.0)
    };
    state.sensors.insert("ph_level".to_string(), finite_or_keep(next, prev));
}

fn step_ec(state: &mut TwinState, delta_secs: f64) {
    let prev = state.sensors.get("ec_level").copied().unwrap_or(1.5);
    let mut next = prev;
    if actuator_on(state, "nutrient_pump") {
        next += 0.02 * (delta_secs / 60.0);
    }
    next -= 0.002 * (delta_secs / 60.0); // slow plant uptake decay
    state
        .sensors
        .insert("ec_level".to_string(), finite_or_keep(next, prev).max(0.0));
}

fn step_water_pressure(state: &mut TwinState) {
    let prev = state.sensors.get("water_pressure").copied().unwrap_or(0.0);
    let target = if actuator_on(state, "pump_active") { 40.0 } else { 0.0 };
    let next = prev + (target - prev) * 0.2;
    state.sensors.insert("water_pressure".to_string(), finite_or_keep(next, prev));
}

fn step_co2(state: &mut TwinState) {
    let prev = state.sensors.get("co2").copied().unwrap_or(400.0);
    let vent = vent_fraction(state);
    let next = if vent > 0.5 { prev - 5.0 } else { prev + 2.0 };
    state
        .sensors
        .insert("co2".to_string(), finite_or_keep(next, prev).clamp(300.0, 1200.0));
}

fn step_dissolved_o2(state: &mut TwinState, delta_secs: f64) {
    let prev = state.sensors.get("dissolved_o2").copied().unwrap_or(6.5);
    let mut next = prev;
    if actuator_on(state, "pump_active") {
        next += 0.1 * (delta_secs / 60.0);
    } else {
        next -= 0.02 * (delta_secs / 60.0);
    }
    state
        .sensors
        .insert("dissolved_o2".to_string(), finite_or_keep(next, prev).clamp(0.0, 20.0));
}

fn accumulate_opex(state: &mut TwinState, delta_secs: f64) {
    let dt_ratio = delta_secs / 3600.0;
    if actuator_on(state, "heater") {
        state.opex.electricity_kwh += HEATER_KW * dt_ratio;
    }
    if actuator_on(state, "fan") {
        state.opex.electricity_kwh += FAN_KW * dt_ratio;
    }
    if actuator_on(state, "pump_active") {
        state.opex.electricity_kwh += PUMP_KW * dt_ratio;
    }
    if actuator_on(state, "grow_light") {
        state.opex.electricity_kwh += GROW_LIGHT_KW * dt_ratio;
    }
    state.opex.utility_cost = state.opex.electricity_kwh * ELECTRICITY_RATE;

    if actuator_on(state, "nutrient_pump") || actuator_on(state, "pump_active") {
        state.opex.nutrients_l += 0.01 * (delta_secs / 60.0);
    }
}

fn update_stress_and_health(state: &mut TwinState, delta_secs: f64) {
    let minutes = (delta_secs / 60.0).max(0.0);
    let temp = state.sensors.get("temperature").copied().unwrap_or(20.0);
    let ph = state.sensors.get("ph_level").copied().unwrap_or(6.5);
    let ec = state.sensors.get("ec_level").copied().unwrap_or(1.5);
    let humidity = state.sensors.get("humidity").copied().unwrap_or(50.0);
    let o2 = state.sensors.get("dissolved_o2").copied().unwrap_or(6.5);

    let mut stress = state.stress_index;
    let unit = minutes.max(1.0 / 60.0); // at least one "tick's worth" of scaling

    if temp > 32.0 {
        stress += (temp - 32.0) * 0.01 * unit;
    } else if temp < 15.0 {
        stress += (15.0 - temp) * 0.01 * unit;
    } else {
        stress -= 0.005 * unit;
    }

    if !(5.5..=7.5).contains(&ph) {
        stress += 0.002 * unit;
    }
    if !(1.0..=2.5).contains(&ec) {
        stress += 0.001 * unit;
    }
    if !(40.0..=80.0).contains(&humidity) {
        stress += 0.001 * unit;
    }
    if o2 < 4.0 {
        stress += 0.002 * unit;
    }

    state.stress_index = stress.clamp(0.0, 1.0);
    if !state.stress_index.is_finite() {
        state.stress_index = 0.0;
    }
    state.plant_health = (1.0 - state.stress_index.powf(0.7)).clamp(0.0, 1.0);

    if state.stress_index > 0.5 {
        state.opex.labor_saved_h += 0.0; // stressed crops require attention, not less
    } else if state.stress_index < 0.2 {
        state.opex.labor_saved_h += 0.5 * (delta_secs / 3600.0);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn step_keeps_everything_finite_and_bounded() {
        let mut state = TwinState::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            step(&mut state, 1.0, 60.0, &mut rng);
        }
        assert!(state.stress_index.is_finite());
        assert!((0.0..=1.0).contains(&state.stress_index));
        assert!((0.0..=1.0).contains(&state.plant_health));
        for value in state.sensors.values() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn negative_delta_is_clamped_not_rejected() {
        let mut state = TwinState::default();
        let mut rng = StdRng::seed_from_u64(1);
        step(&mut state, -5.0, 60.0, &mut rng);
        assert_eq!(state.cycle_count, 1);
    }

    #[test]
    fn deterministic_given_seed_and_trajectory() {
        let mut a = TwinState::default();
        let mut b = TwinState::default();
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            step(&mut a, 1.0, 60.0, &mut rng_a);
            step(&mut b, 1.0, 60.0, &mut rng_b);
        }
        assert_eq!(a.sensors, b.sensors);
        assert_eq!(a.cycle_count, b.cycle_count);
    }
}
