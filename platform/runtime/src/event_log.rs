//! Append-only JSONL event log (§6 persisted state). Implemented as a
//! `UiTransport` so every broadcast event is persisted the same way it is
//! pushed to live UIs, without a second serialization path.

use std::path::PathBuf;

use async_trait::async_trait;
use greenhouse_ui::UiTransport;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::warn;

pub struct EventLogTransport {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl EventLogTransport {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: Mutex::new(None) }
    }

    async fn file(&self) -> std::io::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        *guard = Some(file);
        Ok(())
    }
}

#[async_trait]
impl UiTransport for EventLogTransport {
    async fn send(&self, frame: &str) -> bool {
        if let Err(err) = self.file().await {
            warn!(error = %err, "failed to open event log");
            return true; // a logging failure must not drop the live transport set
        }
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            let line = format!("{frame}\n");
            if let Err(err) = file.write_all(line.as_bytes()).await {
                warn!(error = %err, "failed to append to event log");
            }
        }
        true
    }
}
