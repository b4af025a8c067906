//! Default values for every environment-overridable setting (§10.2).

/// Default HTTP/WebSocket listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default persisted settings blob location.
pub const DEFAULT_SETTINGS_PATH: &str = "./greenhouse-settings.json";

/// Default append-only event log location.
pub const DEFAULT_EVENT_LOG_PATH: &str = "./greenhouse-events.jsonl";

/// Default orchestrator wall-clock budget, in hours.
pub const DEFAULT_BUDGET_HOURS: f64 = 2.0;

/// Default simulated-hours-per-real-hour multiplier.
pub const DEFAULT_TIME_ACCEL: f64 = 60.0;

/// Default UIBridge heartbeat interval, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 2;

/// Default UIBridge stall threshold, in seconds.
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = 10;

/// Default IndustrialBridge telemetry publish interval, in milliseconds.
pub const DEFAULT_TELEMETRY_PUBLISH_MILLIS: u64 = 500;

/// Default IndustrialBridge hardware sampling interval, in milliseconds (10 Hz).
pub const DEFAULT_SAMPLE_INTERVAL_MILLIS: u64 = 100;

/// Window of buffered samples kept for rolling-noise statistics.
pub const SAMPLE_BUFFER_SECS: u64 = 10;

/// Consecutive telemetry-loop failures before the bridge escalates to an
/// emergency stop.
pub const MAX_CONSECUTIVE_TELEMETRY_FAILURES: u32 = 5;

/// Twin physics step interval, in milliseconds. One tick per real second;
/// `time_acceleration` is what makes simulated time run faster than that.
pub const DEFAULT_TWIN_TICK_MILLIS: u64 = 1_000;
