use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::PgRow;

/// A reachable container-engine endpoint with its own port pool and default
/// resource caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerHost {
    pub id: String,
    pub name: String,
    /// Engine connection address, e.g. `tcp://192.168.1.100:2376`. Empty
    /// means environment discovery.
    pub host: String,
    pub tls_verify: bool,
    pub cert_path: String,
    pub port_range_min: i32,
    pub port_range_max: i32,
    /// Default memory limit in bytes for instances on this host.
    pub memory_limit: i64,
    /// Default CPU limit in cores.
    pub cpu_limit: f64,
    pub enabled: bool,
    pub is_default: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DockerHost {
    pub fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            tls_verify: row.try_get("tls_verify")?,
            cert_path: row.try_get("cert_path")?,
            port_range_min: row.try_get("port_range_min")?,
            port_range_max: row.try_get("port_range_max")?,
            memory_limit: row.try_get("memory_limit")?,
            cpu_limit: row.try_get("cpu_limit")?,
            enabled: row.try_get("enabled")?,
            is_default: row.try_get("is_default")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostRequest {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub tls_verify: bool,
    #[serde(default)]
    pub cert_path: String,
    pub port_range_min: i32,
    pub port_range_max: i32,
    pub memory_limit: i64,
    pub cpu_limit: f64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub description: String,
}

impl HostRequest {
    /// Field bounds shared by create and update.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("主机名称不能为空".to_string());
        }
        for port in [self.port_range_min, self.port_range_max] {
            if !(1024..=65535).contains(&port) {
                return Err("端口范围必须在 1024-65535 之间".to_string());
            }
        }
        if self.port_range_min >= self.port_range_max {
            return Err("端口范围最小值必须小于最大值".to_string());
        }
        if self.memory_limit < 64 * 1024 * 1024 {
            return Err("内存限制不能低于 64MB".to_string());
        }
        if !(0.1..=128.0).contains(&self.cpu_limit) {
            return Err("CPU 限制必须在 0.1-128 之间".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HostRequest {
        HostRequest {
            name: "local".to_string(),
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
        }
    }

    #[test]
    fn accepts_sane_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_port_range() {
        let mut req = request();
        req.port_range_min = 40000;
        req.port_range_max = 20000;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_tiny_memory() {
        let mut req = request();
        req.memory_limit = 1024;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_cpu() {
        let mut req = request();
        req.cpu_limit = 0.0;
        assert!(req.validate().is_err());
        req.cpu_limit = 200.0;
        assert!(req.validate().is_err());
    }
}
