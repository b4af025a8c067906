use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub mod constants;

/// Fully resolved startup configuration: defaults, overridden by environment
/// variables, overridden by whatever the binary entrypoint parses from argv.
/// Built once and passed by value into `Runtime::build`; nothing downstream
/// re-reads the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: Option<SocketAddr>,
    pub hardware_endpoint: Option<String>,
    pub settings_path: PathBuf,
    pub event_log_path: PathBuf,
    pub budget: Duration,
    pub time_acceleration: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: Some(constants::DEFAULT_BIND_ADDR.parse().unwrap_or_else(|_| {
                "127.0.0.1:8080"
                    .parse()
                    .expect("literal default bind address is well-formed")
            })),
            hardware_endpoint: None,
            settings_path: PathBuf::from(constants::DEFAULT_SETTINGS_PATH),
            event_log_path: PathBuf::from(constants::DEFAULT_EVENT_LOG_PATH),
            budget: Duration::from_secs_f64(constants::DEFAULT_BUDGET_HOURS * 3600.0),
            time_acceleration: constants::DEFAULT_TIME_ACCEL,
        }
    }
}

impl RuntimeConfig {
    /// Layer process-environment overrides onto the compiled-in defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: greenhouse_env::bind_addr().or(defaults.bind_addr),
            hardware_endpoint: greenhouse_env::hardware_endpoint()
                .or(defaults.hardware_endpoint),
            settings_path: greenhouse_env::settings_path().unwrap_or(defaults.settings_path),
            event_log_path: greenhouse_env::event_log_path().unwrap_or(defaults.event_log_path),
            budget: greenhouse_env::budget_hours()
                .map(|h| Duration::from_secs_f64(h * 3600.0))
                .unwrap_or(defaults.budget),
            time_acceleration: greenhouse_env::time_acceleration()
                .unwrap_or(defaults.time_acceleration),
        }
    }

    #[must_use]
    pub fn http_enabled(&self) -> bool {
        self.bind_addr.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_nothing_unexpected() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.http_enabled());
        assert!(cfg.budget > Duration::ZERO);
        assert!(cfg.time_acceleration > 0.0);
    }
}
