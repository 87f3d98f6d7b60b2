use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub app_env: String,
    /// Lifetime of a challenge instance before the reaper collects it.
    pub instance_ttl: Duration,
    /// Request-log rows older than this many days are deleted.
    pub log_retention_days: i64,
    /// Base URL of the image registry used for sync, import and preload.
    pub registry_url: String,
    /// Staging directory for uploaded image tarballs.
    pub upload_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),
    #[error("invalid listen address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),
    #[error("invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".into()))?;

        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Production refuses to start on a default signing key.
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if is_production(&app_env) => {
                return Err(ConfigError::MissingVar("JWT_SECRET".into()));
            }
            _ => {
                tracing::warn!("JWT_SECRET not set, using development default");
                "range-api-dev-secret-change-in-production".to_string()
            }
        };

        let instance_ttl = Duration::from_secs(parse_var("INSTANCE_TTL_SECS", 3600)?);
        let log_retention_days = parse_var("LOG_RETENTION_DAYS", 7)?;
        let registry_url = std::env::var("REGISTRY_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string());
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("range-api-uploads"));

        Ok(Self {
            listen_addr,
            database_url,
            jwt_secret,
            app_env,
            instance_ttl,
            log_retention_days,
            registry_url,
            upload_dir,
        })
    }

    pub fn is_production(&self) -> bool {
        is_production(&self.app_env)
    }
}

fn is_production(env: &str) -> bool {
    matches!(env, "prod" | "production")
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidVar(name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_matching() {
        assert!(is_production("prod"));
        assert!(is_production("production"));
        assert!(!is_production("dev"));
        assert!(!is_production(""));
    }
}
