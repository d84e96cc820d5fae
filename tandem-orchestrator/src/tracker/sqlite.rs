//! SQLite-backed run tracker
//!
//! Events and invocation snapshots are stored as JSON documents. The
//! autoincrement `seq` column of `run_events` is the history order.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tandem_core::domain::event::RunEvent;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::{EventSink, OrchestrationError, Result, SinkError};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{INVOCATION, RunTracker, clamp_timestamp};

#[derive(sqlx::FromRow)]
struct EventRow {
    payload: String,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    snapshot: String,
}

/// Run tracker persisted in SQLite
pub struct SqliteRunTracker {
    pool: SqlitePool,
    /// Serializes appends so the clamp reads the true previous event
    append_lock: Mutex<()>,
}

impl SqliteRunTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_lock: Mutex::new(()),
        }
    }

    async fn last_event(&self, invocation_id: Uuid) -> Result<Option<RunEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT payload FROM run_events
            WHERE invocation_id = ?
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(invocation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(tracker_error)?;

        row.map(|r| decode(&r.payload)).transpose()
    }

    async fn insert_event(&self, invocation_id: Uuid, mut event: RunEvent) -> Result<()> {
        let _guard = self.append_lock.lock().await;

        let previous = self.last_event(invocation_id).await?;
        clamp_timestamp(previous.map(|e| e.timestamp), &mut event);

        let payload = serde_json::to_string(&event).map_err(tracker_error)?;

        sqlx::query(
            r#"
            INSERT INTO run_events (invocation_id, timestamp, step_index, payload)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(invocation_id.to_string())
        .bind(event.timestamp.to_rfc3339())
        .bind(event.step_index.map(|i| i as i64))
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(tracker_error)?;

        Ok(())
    }
}

#[async_trait]
impl EventSink for SqliteRunTracker {
    async fn append(&self, invocation_id: Uuid, event: RunEvent) -> std::result::Result<(), SinkError> {
        self.insert_event(invocation_id, event)
            .await
            .map_err(|e| SinkError {
                invocation_id,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl RunTracker for SqliteRunTracker {
    async fn history(&self, invocation_id: Uuid) -> Result<Vec<RunEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT payload FROM run_events
            WHERE invocation_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(invocation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(tracker_error)?;

        rows.iter().map(|r| decode(&r.payload)).collect()
    }

    async fn save_invocation(&self, invocation: &PipelineInvocation) -> Result<()> {
        let snapshot = serde_json::to_string(invocation).map_err(tracker_error)?;

        sqlx::query(
            r#"
            INSERT INTO invocations
                (invocation_id, definition_id, overall_status, created_at, ended_at, snapshot)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(invocation_id) DO UPDATE SET
                overall_status = excluded.overall_status,
                ended_at = excluded.ended_at,
                snapshot = excluded.snapshot
            "#,
        )
        .bind(invocation.invocation_id.to_string())
        .bind(invocation.definition_id.as_str())
        .bind(invocation.overall_status.to_string())
        .bind(invocation.created_at.to_rfc3339())
        .bind(invocation.ended_at.map(|t| t.to_rfc3339()))
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .map_err(tracker_error)?;

        Ok(())
    }

    async fn invocation(&self, invocation_id: Uuid) -> Result<PipelineInvocation> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT snapshot FROM invocations WHERE invocation_id = ?",
        )
        .bind(invocation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(tracker_error)?
        .ok_or_else(|| OrchestrationError::not_found(INVOCATION, invocation_id.to_string()))?;

        decode(&row.snapshot)
    }

    async fn list_invocations(&self) -> Result<Vec<PipelineInvocation>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT snapshot FROM invocations ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(tracker_error)?;

        rows.iter().map(|r| decode(&r.snapshot)).collect()
    }
}

fn decode<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(tracker_error)
}

fn tracker_error(err: impl std::fmt::Display) -> OrchestrationError {
    OrchestrationError::Tracker(err.to_string())
}
