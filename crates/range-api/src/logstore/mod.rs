//! Batched asynchronous request-log ingestion: a bounded non-blocking
//! producer, one batch writer, and a retention sweeper. Logging never gets
//! to slow a request down — on overflow entries are counted and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder, Row};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::request_log::ApiLog;

pub const QUEUE_CAPACITY: usize = 1000;
pub const BATCH_SIZE: usize = 100;
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Kept under the flush interval so one slow insert cannot back up the next.
const FLUSH_DEADLINE: Duration = Duration::from_secs(4);

/// Where flushed batches go. The seam keeps the writer testable and matches
/// the store abstraction the rest of the crate uses.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    async fn insert_batch(&self, batch: &[ApiLog]) -> Result<(), sqlx::Error>;
}

pub struct PgLogSink {
    pool: PgPool,
}

impl PgLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for PgLogSink {
    async fn insert_batch(&self, batch: &[ApiLog]) -> Result<(), sqlx::Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO api_logs \
             (id, trace_id, method, path, status, latency_ms, ip, user_agent, \
              user_id, error_message, request_body, response_body, created_at) ",
        );
        qb.push_values(batch, |mut row, log| {
            row.push_bind(&log.id)
                .push_bind(&log.trace_id)
                .push_bind(&log.method)
                .push_bind(&log.path)
                .push_bind(log.status)
                .push_bind(log.latency_ms)
                .push_bind(&log.ip)
                .push_bind(&log.user_agent)
                .push_bind(&log.user_id)
                .push_bind(&log.error_message)
                .push_bind(&log.request_body)
                .push_bind(&log.response_body)
                .push_bind(log.created_at);
        });
        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

/// Producer handle. `store` never blocks and never fails the request path.
#[derive(Clone)]
pub struct RequestLogStore {
    tx: mpsc::Sender<ApiLog>,
    dropped: Arc<AtomicU64>,
}

impl RequestLogStore {
    pub fn store(&self, mut log: ApiLog) {
        if log.id.is_empty() {
            log.id = Uuid::new_v4().to_string();
        }
        if self.tx.try_send(log).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(dropped_total = dropped, "Log queue full, dropping entry");
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct LogWriterHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LogWriterHandle {
    /// Stop the writer: close the queue, fold residual entries into the
    /// batch and flush once.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

pub fn start<S: LogSink>(sink: S) -> (RequestLogStore, LogWriterHandle) {
    start_with(sink, QUEUE_CAPACITY, BATCH_SIZE, FLUSH_INTERVAL)
}

pub fn start_with<S: LogSink>(
    sink: S,
    capacity: usize,
    batch_size: usize,
    flush_interval: Duration,
) -> (RequestLogStore, LogWriterHandle) {
    let (tx, mut rx) = mpsc::channel::<ApiLog>(capacity);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut batch: Vec<ApiLog> = Vec::with_capacity(batch_size);
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_log = rx.recv() => {
                    match maybe_log {
                        Some(log) => {
                            batch.push(log);
                            if batch.len() >= batch_size {
                                flush(&sink, &mut batch).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        flush(&sink, &mut batch).await;
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A dropped handle counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        // Drain whatever is still queued, then flush the remainder.
        rx.close();
        while let Ok(log) = rx.try_recv() {
            batch.push(log);
        }
        flush(&sink, &mut batch).await;
    });

    (
        RequestLogStore {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        LogWriterHandle { shutdown_tx, task },
    )
}

/// One multi-row insert per flush. Failures and deadline overruns drop the
/// batch: availability over completeness.
async fn flush<S: LogSink>(sink: &S, batch: &mut Vec<ApiLog>) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    match tokio::time::timeout(FLUSH_DEADLINE, sink.insert_batch(batch)).await {
        Ok(Ok(())) => tracing::debug!(count = count, "Flushed request-log batch"),
        Ok(Err(err)) => {
            tracing::error!(count = count, error = %err, "Batch insert failed, dropping batch");
        }
        Err(_) => {
            tracing::error!(count = count, "Batch insert timed out, dropping batch");
        }
    }
    batch.clear();
}

// ===== Retention =====

const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 3600);

pub struct RetentionSweeper {
    db: PgPool,
    retention_days: i64,
}

pub struct RetentionHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetentionHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

impl RetentionSweeper {
    pub fn new(db: PgPool, retention_days: i64) -> Self {
        let retention_days = if retention_days <= 0 { 7 } else { retention_days };
        Self { db, retention_days }
    }

    /// Run once at boot, then every 24 hours.
    pub fn start(self) -> RetentionHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(retention_days = self.retention_days, "Log retention sweeper started");
            self.run_once().await;

            let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            tracing::info!("Log retention sweeper stopped");
        });

        RetentionHandle { shutdown_tx, task }
    }

    async fn run_once(&self) {
        match self.cleanup().await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted = deleted, "Expired request logs deleted"),
            Err(err) => tracing::error!(error = %err, "Log retention cleanup failed"),
        }
    }

    pub async fn cleanup(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM api_logs WHERE created_at < now() - ($1 || ' days')::interval")
                .bind(self.retention_days.to_string())
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected())
    }
}

// ===== Queries =====

#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    pub status: Option<i32>,
    pub status_min: Option<i32>,
    pub status_max: Option<i32>,
    /// Substring match on the path.
    pub path: Option<String>,
    pub method: Option<String>,
    pub trace_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

fn push_log_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(min) = filter.status_min {
        qb.push(" AND status >= ").push_bind(min);
    }
    if let Some(max) = filter.status_max {
        qb.push(" AND status <= ").push_bind(max);
    }
    if let Some(path) = &filter.path {
        qb.push(" AND path LIKE ").push_bind(format!("%{path}%"));
    }
    if let Some(method) = &filter.method {
        qb.push(" AND method = ").push_bind(method.clone());
    }
    if let Some(trace_id) = &filter.trace_id {
        qb.push(" AND trace_id = ").push_bind(trace_id.clone());
    }
    if let Some(start) = filter.start_time {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_time {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

pub async fn query_logs(
    pool: &PgPool,
    filter: &LogFilter,
    page: i64,
    page_size: i64,
) -> Result<(Vec<ApiLog>, i64), sqlx::Error> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM api_logs WHERE 1=1");
    push_log_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build().fetch_one(pool).await?.try_get(0)?;

    let mut qb = QueryBuilder::new("SELECT * FROM api_logs WHERE 1=1");
    push_log_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind((page - 1) * page_size);

    let logs = qb
        .build()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(ApiLog::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((logs, total))
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub total_requests: i64,
    pub error_requests: i64,
    pub avg_latency_ms: f64,
    pub today_requests: i64,
    pub today_errors: i64,
}

pub async fn log_stats(pool: &PgPool) -> Result<LogStats, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT
               COUNT(*) AS total_requests,
               COUNT(*) FILTER (WHERE status >= 400) AS error_requests,
               COALESCE(AVG(latency_ms)::double precision, 0) AS avg_latency_ms,
               COUNT(*) FILTER (WHERE created_at >= CURRENT_DATE) AS today_requests,
               COUNT(*) FILTER (WHERE created_at >= CURRENT_DATE AND status >= 400) AS today_errors
           FROM api_logs"#,
    )
    .fetch_one(pool)
    .await?;

    Ok(LogStats {
        total_requests: row.try_get("total_requests")?,
        error_requests: row.try_get("error_requests")?,
        avg_latency_ms: row.try_get("avg_latency_ms")?,
        today_requests: row.try_get("today_requests")?,
        today_errors: row.try_get("today_errors")?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<ApiLog>>>>,
        fail: bool,
    }

    #[async_trait]
    impl LogSink for RecordingSink {
        async fn insert_batch(&self, batch: &[ApiLog]) -> Result<(), sqlx::Error> {
            if self.fail {
                return Err(sqlx::Error::PoolClosed);
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn entry(path: &str) -> ApiLog {
        ApiLog {
            id: String::new(),
            trace_id: Uuid::new_v4().to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            status: 200,
            latency_ms: 1,
            ip: "127.0.0.1".to_string(),
            user_agent: String::new(),
            user_id: String::new(),
            error_message: String::new(),
            request_body: String::new(),
            response_body: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn flushes_when_batch_size_reached() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let (store, handle) = start_with(sink, 100, 3, Duration::from_secs(3600));

        for i in 0..3 {
            store.store(entry(&format!("/api/{i}")));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        {
            let flushed = batches.lock().unwrap();
            assert_eq!(flushed.len(), 1);
            assert_eq!(flushed[0].len(), 3);
            assert!(flushed[0].iter().all(|log| !log.id.is_empty()));
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn flushes_on_timer() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let (store, handle) = start_with(sink, 100, 50, Duration::from_millis(50));

        store.store(entry("/api/slow"));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(batches.lock().unwrap().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_residue() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let (store, handle) = start_with(sink, 100, 50, Duration::from_secs(3600));

        for i in 0..5 {
            store.store(entry(&format!("/api/{i}")));
        }
        handle.shutdown().await;

        let flushed = batches.lock().unwrap();
        let total: usize = flushed.iter().map(Vec::len).sum();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn overflow_increments_drop_counter_instead_of_blocking() {
        // No writer task: the queue stays full after `capacity` entries.
        let (tx, _rx) = mpsc::channel::<ApiLog>(2);
        let store = RequestLogStore {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        for i in 0..10 {
            store.store(entry(&format!("/api/{i}")));
        }
        assert_eq!(store.dropped(), 8);
    }

    #[tokio::test]
    async fn sink_failure_drops_batch_and_keeps_going() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let batches = sink.batches.clone();
        let (store, handle) = start_with(sink, 100, 2, Duration::from_millis(50));

        store.store(entry("/a"));
        store.store(entry("/b"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Nothing recorded, nothing wedged.
        assert!(batches.lock().unwrap().is_empty());
        store.store(entry("/c"));
        handle.shutdown().await;
    }
}
