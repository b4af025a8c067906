//! Persisted settings blob (§6). The only other persisted artifact is the
//! append-only event log, handled in `event_log` as a UI transport.

use std::path::PathBuf;

use greenhouse_core::bcc::compute_bcc;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write settings file: {0}")]
    Write(#[source] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns an empty object if the file has never been written.
    pub async fn load(&self) -> Result<Value, SettingsError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(serde_json::Map::new())),
            Err(err) => Err(SettingsError::Read(err)),
        }
    }

    /// Persists `settings` and returns the BCC of the canonical payload
    /// written, for the caller to surface to external consumers.
    pub async fn save(&self, settings: &Value) -> Result<String, SettingsError> {
        let payload = serde_json::to_string(settings)?;
        fs::write(&self.path, &payload).await.map_err(SettingsError::Write)?;
        Ok(compute_bcc(&payload))
    }
}
