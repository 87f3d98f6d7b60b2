//! Container-engine abstraction. One concrete variant exists (Docker API);
//! the trait keeps the lifecycle service and reaper engine-agnostic so a
//! different backend can substitute without touching them.

pub mod docker;
pub mod pool;

use async_trait::async_trait;
use serde::Serialize;

pub use docker::DockerEngine;
pub use pool::EnginePool;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("container or image not found")]
    NotFound,
    #[error("engine connection failed: {0}")]
    Connect(String),
    #[error("no free port available in host range")]
    PortExhausted,
    #[error("engine api error: {0}")]
    Api(String),
}

/// What the engine needs to materialize one instance container. Zero limit
/// values mean "use the host default".
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub env: Vec<String>,
    pub container_port: u16,
    pub privileged: bool,
    pub memory_limit: i64,
    pub cpu_limit: f64,
}

/// Point-in-time resource usage of one container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    pub container_id: String,
    pub cpu_percent: f64,
    pub memory_usage: i64,
    pub memory_limit: i64,
    pub memory_percent: f64,
    pub network_rx: i64,
    pub network_tx: i64,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Make the image available locally, pulling to completion if needed.
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create and start a container, returning (container id, exposed port).
    async fn start_container(&self, spec: &ContainerSpec) -> Result<(String, u16), EngineError>;

    /// Force-stop and remove a container. `NotFound` means it is already
    /// gone, which callers treat as success.
    async fn stop_container(&self, container_id: &str) -> Result<(), EngineError>;

    async fn stats(&self, container_id: &str) -> Result<ContainerStats, EngineError>;

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError>;

    async fn ping(&self) -> Result<(), EngineError>;
}

/// Resource-limit priority: challenge override beats the host default.
pub fn effective_limits(
    host_memory: i64,
    host_cpu: f64,
    override_memory: i64,
    override_cpu: f64,
) -> (i64, f64) {
    let memory = if override_memory > 0 { override_memory } else { host_memory };
    let cpu = if override_cpu > 0.0 { override_cpu } else { host_cpu };
    (memory, cpu)
}

#[cfg(test)]
pub mod testing {
    //! Fake engine for exercising pool and service seams without a daemon.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MockEngine {
        pub fail_start: bool,
        pub fail_stop: bool,
        pub next_port: u16,
        pub next_container_id: String,
        pub stopped: Mutex<Vec<String>>,
        pub pings: AtomicUsize,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self {
                next_port: 23456,
                next_container_id: "mock-container-id-123".to_string(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ContainerEngine for MockEngine {
        async fn ensure_image(&self, _image: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn start_container(
            &self,
            _spec: &ContainerSpec,
        ) -> Result<(String, u16), EngineError> {
            if self.fail_start {
                return Err(EngineError::Api("simulated start failure".to_string()));
            }
            Ok((self.next_container_id.clone(), self.next_port))
        }

        async fn stop_container(&self, container_id: &str) -> Result<(), EngineError> {
            if self.fail_stop {
                return Err(EngineError::Api("simulated stop failure".to_string()));
            }
            self.stopped.lock().unwrap().push(container_id.to_string());
            Ok(())
        }

        async fn stats(&self, container_id: &str) -> Result<ContainerStats, EngineError> {
            Ok(ContainerStats {
                container_id: container_id.to_string(),
                cpu_percent: 0.0,
                memory_usage: 0,
                memory_limit: 0,
                memory_percent: 0.0,
                network_rx: 0,
                network_tx: 0,
            })
        }

        async fn logs(&self, _container_id: &str, _tail: usize) -> Result<String, EngineError> {
            Ok(String::new())
        }

        async fn ping(&self) -> Result<(), EngineError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_host_default() {
        assert_eq!(
            effective_limits(134217728, 0.5, 268435456, 1.0),
            (268435456, 1.0)
        );
    }

    #[test]
    fn zero_override_falls_back() {
        assert_eq!(effective_limits(134217728, 0.5, 0, 0.0), (134217728, 0.5));
    }

    #[test]
    fn partial_override() {
        assert_eq!(effective_limits(134217728, 0.5, 0, 2.0), (134217728, 2.0));
    }
}
