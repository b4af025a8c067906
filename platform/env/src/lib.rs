//! Thin, typed wrappers around the process environment. Each accessor reads a
//! single variable; nothing here caches a value or interprets absence beyond
//! returning `None`/a default — that belongs to `greenhouse-config`.

use std::{env, net::SocketAddr, path::PathBuf};

#[must_use]
pub fn bind_addr() -> Option<SocketAddr> {
    env::var("GREENHOUSE_BIND_ADDR")
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

#[must_use]
pub fn hardware_endpoint() -> Option<String> {
    env::var("GREENHOUSE_HARDWARE_ENDPOINT").ok()
}

#[must_use]
pub fn settings_path() -> Option<PathBuf> {
    env::var("GREENHOUSE_SETTINGS_PATH").ok().map(PathBuf::from)
}

#[must_use]
pub fn event_log_path() -> Option<PathBuf> {
    env::var("GREENHOUSE_EVENT_LOG_PATH")
        .ok()
        .map(PathBuf::from)
}

#[must_use]
pub fn budget_hours() -> Option<f64> {
    env::var("GREENHOUSE_BUDGET_HOURS")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
}

#[must_use]
pub fn time_acceleration() -> Option<f64> {
    env::var("GREENHOUSE_TIME_ACCEL")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
}

#[must_use]
pub fn rust_log() -> Option<String> {
    env::var("RUST_LOG").ok()
}
