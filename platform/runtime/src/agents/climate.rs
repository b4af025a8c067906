//! The concrete demonstration of "agents subscribe to telemetry and may
//! issue actuator-write requests; every write flows Agent → Bridge →
//! Watchdog → Twin" (§3). The request/response surface answers status
//! queries only; the actual reaction to telemetry runs as a background
//! loop subscribed to the bridge's telemetry topic.

use std::sync::Arc;

use async_trait::async_trait;
use greenhouse_bridge::IndustrialBridge;
use greenhouse_core::{ActuatorValue, Agent, AgentError, Bus, Message, WriteSource};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::info;

const TELEMETRY_TOPIC: &str = "telemetry/industrial";
const SUBSCRIBER_ID: &str = "climate_01";
const LOW_TEMP_C: f64 = 17.0;
const HIGH_TEMP_C: f64 = 30.0;

pub struct ClimateAgent;

#[async_trait]
impl Agent for ClimateAgent {
    fn role(&self) -> &str {
        "climate"
    }

    async fn handle_request(&self, _request: &Message) -> Result<Value, AgentError> {
        Ok(json!({
            "status": "success",
            "policy": format!("heater below {LOW_TEMP_C}C, vent above {HIGH_TEMP_C}C"),
        }))
    }
}

/// Reacts to temperature thresholds via agent-sourced writes, which an
/// active user override still wins over (`Twin::set_actuator` rule 3).
#[must_use]
pub fn spawn_reactive_loop(bus: Arc<Bus>, bridge: Arc<IndustrialBridge>) -> JoinHandle<()> {
    tokio::spawn(async move {
        bus.subscribe(SUBSCRIBER_ID, TELEMETRY_TOPIC).await;
        loop {
            let Some(message) = bus.next_on_topic(SUBSCRIBER_ID, TELEMETRY_TOPIC).await else {
                break;
            };
            let Some(temperature) =
                message.content.get("raw").and_then(|raw| raw.get("temperature")).and_then(Value::as_f64)
            else {
                continue;
            };

            if temperature < LOW_TEMP_C {
                bridge.write_setpoint("heater", ActuatorValue::Bool(true), WriteSource::Agent).await;
            } else if temperature > HIGH_TEMP_C {
                bridge.write_setpoint("vent", ActuatorValue::Scalar(1.0), WriteSource::Agent).await;
            } else {
                bridge.write_setpoint("heater", ActuatorValue::Bool(false), WriteSource::Agent).await;
            }
            info!(temperature, "climate agent reacted to telemetry");
        }
    })
}
