//! Host-client pool: one engine client per host id, built lazily and
//! invalidated when an operator edits the host configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::host::DockerHost;

use super::{ContainerEngine, DockerEngine, EngineError};

#[derive(Default)]
pub struct EnginePool {
    clients: RwLock<HashMap<String, Arc<dyn ContainerEngine>>>,
}

impl EnginePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached client for the host, constructing one under the write lock on
    /// first use. Double-checked so concurrent callers build at most once.
    pub async fn get_or_create(
        &self,
        host: &DockerHost,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        if let Some(client) = self.clients.read().await.get(&host.id) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(&host.id) {
            return Ok(client.clone());
        }

        let client: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::connect(host).await?);
        clients.insert(host.id.clone(), client.clone());
        Ok(client)
    }

    /// Drop the cached client so the next use reconstructs it with fresh
    /// host parameters.
    pub async fn remove(&self, host_id: &str) {
        self.clients.write().await.remove(host_id);
    }

    /// Health probe through a (possibly newly constructed) client.
    pub async fn ping(&self, host: &DockerHost) -> Result<(), EngineError> {
        let client = self.get_or_create(host).await?;
        client.ping().await
    }

    #[cfg(test)]
    async fn insert(&self, host_id: &str, client: Arc<dyn ContainerEngine>) {
        self.clients
            .write()
            .await
            .insert(host_id.to_string(), client);
    }

    #[cfg(test)]
    async fn cached(&self, host_id: &str) -> Option<Arc<dyn ContainerEngine>> {
        self.clients.read().await.get(host_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;

    use crate::engine::testing::MockEngine;

    use super::*;

    fn host(id: &str) -> DockerHost {
        DockerHost {
            id: id.to_string(),
            name: "test host".to_string(),
            host: String::new(),
            tls_verify: false,
            cert_path: String::new(),
            port_range_min: 20000,
            port_range_max: 40000,
            memory_limit: 134217728,
            cpu_limit: 0.5,
            enabled: true,
            is_default: true,
            description: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn returns_cached_client_without_reconstruction() {
        let pool = EnginePool::new();
        let mock: Arc<dyn ContainerEngine> = Arc::new(MockEngine::new());
        pool.insert("h1", mock.clone()).await;

        let client = pool.get_or_create(&host("h1")).await.unwrap();
        assert!(Arc::ptr_eq(&client, &mock));
    }

    #[tokio::test]
    async fn remove_invalidates_cache_entry() {
        let pool = EnginePool::new();
        pool.insert("h1", Arc::new(MockEngine::new())).await;
        pool.insert("h2", Arc::new(MockEngine::new())).await;

        pool.remove("h1").await;
        assert!(pool.cached("h1").await.is_none());
        assert!(pool.cached("h2").await.is_some());
    }

    #[tokio::test]
    async fn ping_goes_through_cached_client() {
        let pool = EnginePool::new();
        let mock = Arc::new(MockEngine::new());
        pool.insert("h1", mock.clone() as Arc<dyn ContainerEngine>).await;

        pool.ping(&host("h1")).await.unwrap();
        assert_eq!(mock.pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[ignore = "requires a reachable docker daemon"]
    async fn constructs_real_client_from_environment() {
        let pool = EnginePool::new();
        let client = pool.get_or_create(&host("h-real")).await.unwrap();
        client.ping().await.unwrap();
    }
}
