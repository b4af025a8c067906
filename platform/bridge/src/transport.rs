//! The physical-world side of the bridge. A real deployment plugs in a
//! driver over the configured hardware endpoint; absent that, the null
//! transport always fails to connect, which is what forces the bridge's
//! documented simulation fallback.

use std::collections::BTreeMap;

use async_trait::async_trait;
use greenhouse_core::ActuatorValue;

#[async_trait]
pub trait HardwareTransport: Send + Sync {
    async fn connect(&self) -> bool;
    async fn write_actuator(&self, actuator_id: &str, value: ActuatorValue) -> bool;
    async fn sample(&self) -> Result<BTreeMap<String, f64>, String>;
    async fn disconnect(&self);
}

pub struct NullHardwareTransport;

#[async_trait]
impl HardwareTransport for NullHardwareTransport {
    async fn connect(&self) -> bool {
        false
    }

    async fn write_actuator(&self, _actuator_id: &str, _value: ActuatorValue) -> bool {
        false
    }

    async fn sample(&self) -> Result<BTreeMap<String, f64>, String> {
        Err("no hardware transport configured".to_string())
    }

    async fn disconnect(&self) {}
}
