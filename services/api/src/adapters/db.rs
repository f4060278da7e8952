//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ArtifactStore` and `UsageStore` ports from the `core` crate. It handles
//! all interactions with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, FromRow};
use tracing::debug;
use wiki_quiz_core::domain::{HistoryRecord, HistorySummary, QuizArtifact, UsageWindow};
use wiki_quiz_core::ports::{ArtifactStore, PortError, PortResult, UsageStore};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Waits for in-flight queries and closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct HistoryRow {
    id: i64,
    url: String,
    title: String,
    created_at: DateTime<Utc>,
    artifact: String,
}
impl HistoryRow {
    fn to_domain(self) -> PortResult<HistoryRecord> {
        let artifact = QuizArtifact::from_blob(&self.artifact).map_err(|e| {
            PortError::Unexpected(format!("Stored quiz {} is corrupt: {}", self.id, e))
        })?;
        Ok(HistoryRecord {
            id: self.id,
            url: self.url,
            title: self.title,
            created_at: self.created_at,
            artifact,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    id: i64,
    url: String,
    title: String,
    created_at: DateTime<Utc>,
}
impl SummaryRow {
    fn to_domain(self) -> HistorySummary {
        HistorySummary {
            id: self.id,
            url: self.url,
            title: self.title,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UsageRow {
    client_key: String,
    count: i64,
    window_start: DateTime<Utc>,
}
impl UsageRow {
    fn to_domain(self) -> UsageWindow {
        UsageWindow {
            client_key: self.client_key,
            count: u32::try_from(self.count.max(0)).unwrap_or(u32::MAX),
            window_start: self.window_start,
        }
    }
}

//=========================================================================================
// `ArtifactStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ArtifactStore for DbAdapter {
    async fn find_by_url(&self, url: &str) -> PortResult<Option<HistoryRecord>> {
        sqlx::query_as::<_, HistoryRow>(
            "SELECT id, url, title, created_at, artifact FROM quiz_history WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(HistoryRow::to_domain)
        .transpose()
    }

    async fn create(
        &self,
        url: &str,
        title: &str,
        artifact: &QuizArtifact,
    ) -> PortResult<HistoryRecord> {
        let blob = artifact
            .to_blob()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let row = sqlx::query_as::<_, HistoryRow>(
            "INSERT INTO quiz_history (url, title, created_at, artifact) VALUES (?, ?, ?, ?) \
             RETURNING id, url, title, created_at, artifact",
        )
        .bind(url)
        .bind(title)
        .bind(Utc::now())
        .bind(blob)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("A quiz for {} already exists", url))
            }
            other => unexpected(other),
        })?;

        debug!(id = row.id, url, "Inserted quiz history row.");
        row.to_domain()
    }

    async fn list_all(&self) -> PortResult<Vec<HistorySummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, url, title, created_at FROM quiz_history ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(rows.into_iter().map(SummaryRow::to_domain).collect())
    }

    async fn find_by_id(&self, id: i64) -> PortResult<Option<HistoryRecord>> {
        sqlx::query_as::<_, HistoryRow>(
            "SELECT id, url, title, created_at, artifact FROM quiz_history WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(HistoryRow::to_domain)
        .transpose()
    }
}

//=========================================================================================
// `UsageStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UsageStore for DbAdapter {
    async fn get_window(&self, client_key: &str) -> PortResult<Option<UsageWindow>> {
        let row = sqlx::query_as::<_, UsageRow>(
            "SELECT client_key, count, window_start FROM usage_windows WHERE client_key = ?",
        )
        .bind(client_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(row.map(UsageRow::to_domain))
    }

    async fn put_window(&self, window: &UsageWindow) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO usage_windows (client_key, count, window_start) VALUES (?, ?, ?) \
             ON CONFLICT (client_key) DO UPDATE SET \
             count = excluded.count, window_start = excluded.window_start",
        )
        .bind(&window.client_key)
        .bind(i64::from(window.count))
        .bind(window.window_start)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn prune_windows(&self, older_than: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM usage_windows WHERE window_start < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}
