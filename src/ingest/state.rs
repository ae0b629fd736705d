// src/ingest/state.rs
// Atomic, file-backed ingestion checkpoint.

use crate::error::{ServiceError, ServiceResult};
use crate::models::{ChannelIngestionState, IngestionState};
use chrono::Utc;
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::warn;

pub struct IngestionStateStore {
    path: PathBuf,
    state: Mutex<IngestionState>,
}

impl IngestionStateStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn last_ingested_ts(&self, channel_id: &str) -> Option<String> {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .and_then(|c| c.last_ingested_ts.clone())
    }

    pub fn next_run_id(&self) -> u64 {
        self.state.lock().run_id
    }

    /// Advances the checkpoint for a channel. Never moves it backward: a
    /// `new_ts` that sorts before the stored one, lexically on the
    /// platform's monotonic timestamp string, is ignored.
    pub fn advance(&self, channel_id: &str, new_ts: &str, messages_this_run: u64) -> ServiceResult<()> {
        {
            let mut state = self.state.lock();
            let entry = state.channels.entry(channel_id.to_string()).or_default();

            let should_advance = entry
                .last_ingested_ts
                .as_ref()
                .map(|current| ts_greater(new_ts, current))
                .unwrap_or(true);

            if should_advance {
                entry.last_ingested_ts = Some(new_ts.to_string());
            }
            entry.last_success_at = Some(Utc::now());
            entry.message_count += messages_this_run;
            state.first_run_completed = true;
        }

        self.flush()
    }

    pub fn bump_run_id(&self) -> u64 {
        let mut state = self.state.lock();
        state.run_id += 1;
        state.run_id
    }

    pub fn channel_state(&self, channel_id: &str) -> ChannelIngestionState {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> IngestionState {
        self.state.lock().clone()
    }

    fn flush(&self) -> ServiceResult<()> {
        let snapshot = self.state.lock().clone();
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            warn!("failed to rename checkpoint into place: {}", e);
            ServiceError::PersistenceWriteFailed(e.to_string())
        })?;

        Ok(())
    }
}

/// Compares platform timestamp strings (`"1699999999.000100"`-shaped) by
/// parsed numeric value where possible, falling back to lexical order.
fn ts_greater(a: &str, b: &str) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x > y,
        _ => a > b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_checkpoint_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = IngestionStateStore::load(dir.path().join("state.json"));

        store.advance("C1", "100.0001", 3).unwrap();
        assert_eq!(store.last_ingested_ts("C1"), Some("100.0001".to_string()));

        store.advance("C1", "200.0002", 1).unwrap();
        assert_eq!(store.last_ingested_ts("C1"), Some("200.0002".to_string()));
    }

    #[test]
    fn advance_never_moves_checkpoint_backward() {
        let dir = tempfile::tempdir().unwrap();
        let store = IngestionStateStore::load(dir.path().join("state.json"));

        store.advance("C1", "500.0", 1).unwrap();
        store.advance("C1", "100.0", 1).unwrap();

        assert_eq!(store.last_ingested_ts("C1"), Some("500.0".to_string()));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = IngestionStateStore::load(&path);
            store.advance("C1", "42.0", 5).unwrap();
        }

        let reloaded = IngestionStateStore::load(&path);
        assert_eq!(reloaded.last_ingested_ts("C1"), Some("42.0".to_string()));
        assert_eq!(reloaded.channel_state("C1").message_count, 5);
    }
}
