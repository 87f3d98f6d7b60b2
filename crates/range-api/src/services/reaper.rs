//! Scheduled sweep that forcefully terminates expired instances. Cleanup is
//! driven from the authoritative row so a partially consistent index never
//! blocks progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::PgPool;
use crate::engine::{EngineError, EnginePool};
use crate::index::InstanceIndex;
use crate::store;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Reaper {
    db: PgPool,
    engines: Arc<EnginePool>,
    index: Arc<dyn InstanceIndex>,
    interval: Duration,
}

/// Handle to the running sweep task.
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

impl Reaper {
    pub fn new(db: PgPool, engines: Arc<EnginePool>, index: Arc<dyn InstanceIndex>) -> Self {
        Self {
            db,
            engines,
            index,
            interval: SWEEP_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the sweep loop. Single task; an in-flight sweep always finishes
    /// before shutdown completes.
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "Reaper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval is immediate; skip it so
            // the first sweep happens one full interval after boot.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // A dropped handle counts as shutdown.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            tracing::info!("Reaper stopped");
        });

        ReaperHandle { shutdown_tx, task }
    }

    /// One pass: collect due ids from the expiry index and kill each one.
    pub async fn sweep(&self) {
        let now = Utc::now().timestamp();
        let expired = match self.index.expired_before(now).await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!(error = %err, "Reaper failed to scan expiry index");
                return;
            }
        };

        tracing::debug!(now = now, expired = ?expired, "Reaper scan complete");
        if expired.is_empty() {
            return;
        }

        tracing::info!(count = expired.len(), "Reaper found expired instances");
        for instance_id in expired {
            self.kill_instance(&instance_id).await;
        }
    }

    async fn kill_instance(&self, instance_id: &str) {
        // The index hash may already be gone; it is only a fallback here.
        let record = self.index.get_instance(instance_id).await.ok().flatten();

        let row = match store::get_instance(&self.db, instance_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    "Reaper: instance not in database, removing dangling expiry entry"
                );
                if let Err(err) = self.index.remove_from_expiry(instance_id).await {
                    tracing::error!(instance_id = %instance_id, error = %err, "Failed to drop expiry entry");
                }
                return;
            }
            Err(err) => {
                tracing::error!(instance_id = %instance_id, error = %err, "Reaper: database read failed");
                return;
            }
        };

        let container_id = record
            .as_ref()
            .filter(|rec| !rec.container_id.is_empty())
            .map(|rec| rec.container_id.clone())
            .unwrap_or_else(|| row.container_id.clone());

        let host = match store::get_host(&self.db, &row.docker_host_id).await {
            Ok(Some(host)) => host,
            Ok(None) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    docker_host_id = %row.docker_host_id,
                    "Reaper: host gone, abandoning container and clearing records"
                );
                self.expire_records(instance_id, &row.user_id).await;
                return;
            }
            Err(err) => {
                tracing::error!(instance_id = %instance_id, error = %err, "Reaper: host read failed");
                return;
            }
        };

        let engine = match self.engines.get_or_create(&host).await {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(
                    host = %host.name,
                    error = %err,
                    "Reaper: engine client unavailable, clearing records anyway"
                );
                self.expire_records(instance_id, &row.user_id).await;
                return;
            }
        };

        match engine.stop_container(&container_id).await {
            Ok(()) | Err(EngineError::NotFound) => {}
            Err(err) => {
                tracing::warn!(
                    container_id = %container_id,
                    host = %host.name,
                    error = %err,
                    "Reaper: container stop failed, cleaning up records anyway"
                );
            }
        }

        self.expire_records(instance_id, &row.user_id).await;
        tracing::info!(
            instance_id = %instance_id,
            container_id = %container_id,
            host = %host.name,
            "Reaper: expired instance terminated"
        );
    }

    async fn expire_records(&self, instance_id: &str, user_id: &str) {
        if let Err(err) = self.index.delete_instance(instance_id, user_id).await {
            tracing::error!(instance_id = %instance_id, error = %err, "Reaper: index cleanup failed");
        }
        if let Err(err) = store::set_instance_status(&self.db, instance_id, "expired").await {
            tracing::warn!(instance_id = %instance_id, error = %err, "Reaper: status update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::postgres::PgPoolOptions;

    use crate::index::MemoryIndex;

    use super::*;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/range_test")
            .unwrap()
    }

    #[tokio::test]
    async fn sweep_with_empty_index_touches_nothing() {
        let reaper = Reaper::new(lazy_pool(), Arc::new(EnginePool::new()), Arc::new(MemoryIndex::new()));
        // No expired ids: the sweep returns before any store access, so the
        // lazy (unconnected) pool is never exercised.
        reaper.sweep().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let reaper = Reaper::new(lazy_pool(), Arc::new(EnginePool::new()), Arc::new(MemoryIndex::new()))
            .with_interval(Duration::from_secs(3600));
        let handle = reaper.start();
        handle.shutdown().await;
    }
}
