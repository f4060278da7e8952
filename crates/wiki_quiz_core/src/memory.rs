//! crates/wiki_quiz_core/src/memory.rs
//!
//! Process-local implementations of the storage ports. Useful for tests and
//! for running the pipeline without a database.

use crate::domain::{HistoryRecord, HistorySummary, QuizArtifact, UsageWindow};
use crate::ports::{ArtifactStore, Clock, PortError, PortResult, SystemClock, UsageStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Records {
    next_id: i64,
    by_id: Vec<HistoryRecord>,
}

/// An `ArtifactStore` held in memory. Ids start at 1.
pub struct InMemoryArtifactStore {
    records: Mutex<Records>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryArtifactStore {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(Records::default()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn find_by_url(&self, url: &str) -> PortResult<Option<HistoryRecord>> {
        let records = self.records.lock().await;
        Ok(records.by_id.iter().find(|r| r.url == url).cloned())
    }

    async fn create(
        &self,
        url: &str,
        title: &str,
        artifact: &QuizArtifact,
    ) -> PortResult<HistoryRecord> {
        let mut records = self.records.lock().await;
        if records.by_id.iter().any(|r| r.url == url) {
            return Err(PortError::Conflict(format!("A quiz for {} already exists", url)));
        }

        records.next_id += 1;
        let record = HistoryRecord {
            id: records.next_id,
            url: url.to_string(),
            title: title.to_string(),
            created_at: self.clock.now(),
            artifact: artifact.clone(),
        };
        records.by_id.push(record.clone());
        Ok(record)
    }

    async fn list_all(&self) -> PortResult<Vec<HistorySummary>> {
        let records = self.records.lock().await;
        let mut summaries: Vec<HistorySummary> =
            records.by_id.iter().map(HistorySummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn find_by_id(&self, id: i64) -> PortResult<Option<HistoryRecord>> {
        let records = self.records.lock().await;
        Ok(records.by_id.iter().find(|r| r.id == id).cloned())
    }
}

/// A `UsageStore` held in memory.
#[derive(Default)]
pub struct InMemoryUsageStore {
    windows: Mutex<HashMap<String, UsageWindow>>,
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get_window(&self, client_key: &str) -> PortResult<Option<UsageWindow>> {
        Ok(self.windows.lock().await.get(client_key).cloned())
    }

    async fn put_window(&self, window: &UsageWindow) -> PortResult<()> {
        self.windows
            .lock()
            .await
            .insert(window.client_key.clone(), window.clone());
        Ok(())
    }

    async fn prune_windows(&self, older_than: DateTime<Utc>) -> PortResult<u64> {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| w.window_start >= older_than);
        Ok((before - windows.len()) as u64)
    }
}
