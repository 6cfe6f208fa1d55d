//! Durable sync cursor and the full-vs-incremental resync decision.
//!
//! The watermark is read once at the start of a pass and written once at the
//! end of a successful pass. Writes are unconditional: a single active runner
//! per job is assumed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::model::Watermark;

/// Window start used by a full resync (epoch start, in milliseconds).
pub const FULL_RESYNC_WINDOW_START: i64 = 1;

/// Durable storage of a job's watermark.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&self) -> SyncResult<Watermark>;
    async fn put(&self, watermark: Watermark) -> SyncResult<()>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// True iff `now` is strictly after `last_full_resync_ms + interval`.
#[must_use]
pub fn should_full_resync(last_full_resync_ms: i64, interval: Duration, now: DateTime<Utc>) -> bool {
    let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis() > last_full_resync_ms.saturating_add(interval_ms)
}

/// Time window of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncWindow {
    pub full_resync: bool,
    /// Events since this timestamp (ms) are fetched.
    pub start: i64,
    /// Start of the pass (ms); becomes the next `last_consumed_timestamp`.
    pub pass_started_at: i64,
    pub last_full_resync: i64,
}

impl ResyncWindow {
    /// Decide the window for a pass starting at `now`.
    #[must_use]
    pub fn plan(watermark: Watermark, full_resync_interval: Duration, now: DateTime<Utc>) -> Self {
        let now_ms = now.timestamp_millis();
        if should_full_resync(watermark.last_full_resync_timestamp, full_resync_interval, now) {
            Self {
                full_resync: true,
                start: FULL_RESYNC_WINDOW_START,
                pass_started_at: now_ms,
                last_full_resync: now_ms,
            }
        } else {
            Self {
                full_resync: false,
                start: watermark.last_consumed_timestamp,
                pass_started_at: now_ms,
                last_full_resync: watermark.last_full_resync_timestamp,
            }
        }
    }

    /// Watermark persisted after the pass succeeds.
    #[must_use]
    pub fn next_watermark(&self) -> Watermark {
        Watermark {
            last_consumed_timestamp: self.pass_started_at,
            last_full_resync_timestamp: self.last_full_resync,
        }
    }
}

/// Watermark kept in memory, for tests and single-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    inner: RwLock<Watermark>,
}

impl InMemoryWatermarkStore {
    #[must_use]
    pub fn new(watermark: Watermark) -> Self {
        Self {
            inner: RwLock::new(watermark),
        }
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn get(&self) -> SyncResult<Watermark> {
        Ok(*self.inner.read().await)
    }

    async fn put(&self, watermark: Watermark) -> SyncResult<()> {
        *self.inner.write().await = watermark;
        Ok(())
    }
}

/// Watermark stored in Postgres, one row per job.
///
/// A missing row reads as the zero watermark, which forces a full resync.
#[derive(Debug, Clone)]
pub struct PgWatermarkStore {
    pool: PgPool,
    job_name: String,
}

impl PgWatermarkStore {
    pub fn new(pool: PgPool, job_name: impl Into<String>) -> Self {
        Self {
            pool,
            job_name: job_name.into(),
        }
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn get(&self) -> SyncResult<Watermark> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r"
            SELECT last_consumed_timestamp, last_full_resync_timestamp
            FROM tenant_sync_watermarks
            WHERE job_name = $1
            ",
        )
        .bind(&self.job_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::watermark(format!("failed to read watermark: {e}")))?;

        Ok(row
            .map(|(consumed, full)| Watermark {
                last_consumed_timestamp: consumed,
                last_full_resync_timestamp: full,
            })
            .unwrap_or_default())
    }

    async fn put(&self, watermark: Watermark) -> SyncResult<()> {
        sqlx::query(
            r"
            INSERT INTO tenant_sync_watermarks (
                job_name, last_consumed_timestamp, last_full_resync_timestamp
            )
            VALUES ($1, $2, $3)
            ON CONFLICT (job_name) DO UPDATE SET
                last_consumed_timestamp = EXCLUDED.last_consumed_timestamp,
                last_full_resync_timestamp = EXCLUDED.last_full_resync_timestamp,
                updated_at = NOW()
            ",
        )
        .bind(&self.job_name)
        .bind(watermark.last_consumed_timestamp)
        .bind(watermark.last_full_resync_timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::watermark(format!("failed to persist watermark: {e}")))?;
        Ok(())
    }
}
