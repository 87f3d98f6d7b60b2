//! Docker-API engine client built on bollard.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::container::{
    Config, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use rand::Rng;

use crate::models::host::DockerHost;

use super::{effective_limits, ContainerEngine, ContainerSpec, ContainerStats, EngineError};

const CONNECT_TIMEOUT_SECS: u64 = 120;
const MAX_PORT_ATTEMPTS: usize = 8;
const DEFAULT_LOG_TAIL: usize = 200;
const MAX_LOG_TAIL: usize = 5000;

/// Tracks which host ports this client has handed out, so random selection
/// skips ports already bound by live instances on the same host.
#[derive(Default)]
struct PortLedger {
    by_container: HashMap<String, u16>,
    reserved: HashSet<u16>,
}

impl PortLedger {
    fn allocate(&mut self, min: u16, max: u16) -> Result<u16, EngineError> {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let candidate = rng.gen_range(min..=max);
            if self.reserved.insert(candidate) {
                return Ok(candidate);
            }
        }
        Err(EngineError::PortExhausted)
    }

    fn commit(&mut self, container_id: &str, port: u16) {
        self.by_container.insert(container_id.to_string(), port);
    }

    fn release(&mut self, port: u16) {
        self.reserved.remove(&port);
    }

    fn release_container(&mut self, container_id: &str) {
        if let Some(port) = self.by_container.remove(container_id) {
            self.reserved.remove(&port);
        }
    }
}

pub struct DockerEngine {
    client: Docker,
    host_id: String,
    port_range_min: u16,
    port_range_max: u16,
    memory_limit: i64,
    cpu_limit: f64,
    ports: Mutex<PortLedger>,
}

impl DockerEngine {
    /// Build a client for the host. Empty endpoint falls back to environment
    /// discovery; TLS hosts read the ca/cert/key triple under `cert_path`.
    /// The API version is negotiated with the server before first use.
    pub async fn connect(host: &DockerHost) -> Result<Self, EngineError> {
        let client = if host.host.is_empty() {
            // Environment discovery, honoring DOCKER_HOST when set.
            match std::env::var("DOCKER_HOST") {
                Ok(env_host) if env_host.starts_with("unix://") => Docker::connect_with_unix(
                    &env_host,
                    CONNECT_TIMEOUT_SECS,
                    API_DEFAULT_VERSION,
                ),
                Ok(env_host) if !env_host.is_empty() => {
                    Docker::connect_with_http(&env_host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                }
                _ => Docker::connect_with_local_defaults(),
            }
        } else if host.tls_verify && !host.cert_path.is_empty() {
            let dir = Path::new(&host.cert_path);
            Docker::connect_with_ssl(
                &host.host,
                &dir.join("key.pem"),
                &dir.join("cert.pem"),
                &dir.join("ca.pem"),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )
        } else {
            Docker::connect_with_http(&host.host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(|err| EngineError::Connect(err.to_string()))?;

        let client = client
            .negotiate_version()
            .await
            .map_err(|err| EngineError::Connect(err.to_string()))?;

        Ok(Self {
            client,
            host_id: host.id.clone(),
            port_range_min: host.port_range_min.clamp(1, 65535) as u16,
            port_range_max: host.port_range_max.clamp(1, 65535) as u16,
            memory_limit: host.memory_limit,
            cpu_limit: host.cpu_limit,
            ports: Mutex::new(PortLedger::default()),
        })
    }

    async fn try_create_and_start(
        &self,
        spec: &ContainerSpec,
        host_port: u16,
        memory: i64,
        cpu: f64,
    ) -> Result<String, bollard::errors::Error> {
        let port_key = format!("{}/tcp", spec.container_port);

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );

        let host_config = HostConfig {
            memory: Some(memory),
            nano_cpus: Some((cpu * 1e9) as i64),
            privileged: Some(spec.privileged),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self.client.create_container::<&str, String>(None, config).await?;

        if let Err(err) = self
            .client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Container exists but never ran; remove it so it cannot leak.
            let _ = self
                .client
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(err);
        }

        Ok(created.id)
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_port_conflict(err: &bollard::errors::Error) -> bool {
    let message = err.to_string();
    message.contains("port is already allocated") || message.contains("address already in use")
}

fn map_err(err: bollard::errors::Error) -> EngineError {
    if is_not_found(&err) {
        EngineError::NotFound
    } else {
        EngineError::Api(err.to_string())
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        if self.client.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(host_id = %self.host_id, image = %image, "Pulling image");
        let mut pull = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            progress.map_err(map_err)?;
        }
        Ok(())
    }

    async fn start_container(&self, spec: &ContainerSpec) -> Result<(String, u16), EngineError> {
        self.ensure_image(&spec.image).await?;

        let (memory, cpu) = effective_limits(
            self.memory_limit,
            self.cpu_limit,
            spec.memory_limit,
            spec.cpu_limit,
        );

        let mut attempt = 0;
        loop {
            let port = {
                let mut ledger = self.ports.lock().unwrap();
                ledger.allocate(self.port_range_min, self.port_range_max)?
            };

            match self.try_create_and_start(spec, port, memory, cpu).await {
                Ok(container_id) => {
                    self.ports.lock().unwrap().commit(&container_id, port);
                    return Ok((container_id, port));
                }
                Err(err) => {
                    self.ports.lock().unwrap().release(port);
                    attempt += 1;
                    if is_port_conflict(&err) && attempt < MAX_PORT_ATTEMPTS {
                        tracing::warn!(
                            host_id = %self.host_id,
                            port = port,
                            "Port binding rejected, retrying with a new port"
                        );
                        continue;
                    }
                    return Err(map_err(err));
                }
            }
        }
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), EngineError> {
        let stop = self
            .client
            .stop_container(container_id, Some(StopContainerOptions { t: 0 }))
            .await;
        match stop {
            Ok(()) => {}
            Err(err) if is_not_found(&err) => {
                self.ports.lock().unwrap().release_container(container_id);
                return Err(EngineError::NotFound);
            }
            Err(err) => return Err(map_err(err)),
        }

        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_err)?;

        self.ports.lock().unwrap().release_container(container_id);
        Ok(())
    }

    async fn stats(&self, container_id: &str) -> Result<ContainerStats, EngineError> {
        let mut stream = self.client.stats(
            container_id,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );
        let stats = stream
            .next()
            .await
            .ok_or_else(|| EngineError::Api("empty stats stream".to_string()))?
            .map_err(map_err)?;

        let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
            - stats.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 {
            (cpu_delta / system_delta) * stats.cpu_stats.online_cpus.unwrap_or(1) as f64 * 100.0
        } else {
            0.0
        };

        let memory_usage = stats.memory_stats.usage.unwrap_or(0) as i64;
        let memory_limit = stats.memory_stats.limit.unwrap_or(0) as i64;
        let memory_percent = if memory_limit > 0 {
            memory_usage as f64 / memory_limit as f64 * 100.0
        } else {
            0.0
        };

        let (network_rx, network_tx) = stats
            .networks
            .unwrap_or_default()
            .values()
            .fold((0i64, 0i64), |(rx, tx), net| {
                (rx + net.rx_bytes as i64, tx + net.tx_bytes as i64)
            });

        Ok(ContainerStats {
            container_id: container_id.to_string(),
            cpu_percent,
            memory_usage,
            memory_limit,
            memory_percent,
            network_rx,
            network_tx,
        })
    }

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError> {
        let tail = match tail {
            0 => DEFAULT_LOG_TAIL,
            t => t.min(MAX_LOG_TAIL),
        };

        let mut stream = self.client.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                timestamps: true,
                tail: tail.to_string(),
                ..Default::default()
            }),
        );

        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk.map_err(map_err)? {
                LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                _ => {}
            }
        }
        Ok(output)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.client.ping().await.map_err(map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_allocates_within_range_and_skips_reserved() {
        let mut ledger = PortLedger::default();
        let first = ledger.allocate(30000, 30001).unwrap();
        let second = ledger.allocate(30000, 30001).unwrap();
        assert_ne!(first, second);
        assert!((30000..=30001).contains(&first));
        assert!((30000..=30001).contains(&second));
        assert!(ledger.allocate(30000, 30001).is_err());
    }

    #[test]
    fn ledger_release_returns_port_to_pool() {
        let mut ledger = PortLedger::default();
        let port = ledger.allocate(30000, 30000).unwrap();
        assert!(ledger.allocate(30000, 30000).is_err());
        ledger.release(port);
        assert_eq!(ledger.allocate(30000, 30000).unwrap(), port);
    }

    #[test]
    fn ledger_frees_port_with_container() {
        let mut ledger = PortLedger::default();
        let port = ledger.allocate(30000, 30000).unwrap();
        ledger.commit("c1", port);
        ledger.release_container("c1");
        assert_eq!(ledger.allocate(30000, 30000).unwrap(), port);
        // Unknown containers are a no-op.
        ledger.release_container("c2");
    }
}
