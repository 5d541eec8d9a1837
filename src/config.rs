use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use dotenvy::dotenv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    MySql,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(StorageKind::MySql),
            "memory" => Ok(StorageKind::Memory),
            other => bail!("unknown storage backend {other:?}, expected mysql or memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub storage: StorageKind,
    pub database_url: Option<String>,
    pub jwt_secret: String,

    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_socket_per_min: u32,

    // Attendance
    pub request_timeout: Duration,
    pub long_shift_hours: f64,

    // Realtime
    pub counts_ttl: Duration,
    pub ws_heartbeat: Duration,
    pub ws_client_timeout: Duration,
    pub ws_outbound_buffer: usize,
    pub event_bus_capacity: usize,

    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            storage: StorageKind::MySql,
            database_url: None,
            jwt_secret: String::new(),
            api_prefix: "/api".to_string(),
            rate_protected_per_min: 1000,
            rate_socket_per_min: 30,
            request_timeout: Duration::from_secs(10),
            long_shift_hours: 12.0,
            counts_ttl: Duration::from_secs(300),
            ws_heartbeat: Duration::from_secs(15),
            ws_client_timeout: Duration::from_secs(45),
            ws_outbound_buffer: 64,
            event_bus_capacity: 1024,
            log_dir: "logs".to_string(),
        }
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> anyhow::Result<Duration> {
    var_or(key, default.as_secs()).map(Duration::from_secs)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        let d = Config::default();

        let config = Self {
            server_addr: var_or("SERVER_ADDR", d.server_addr)?,
            storage: var_or("STORAGE", d.storage)?,
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            api_prefix: var_or("API_PREFIX", d.api_prefix)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", d.rate_protected_per_min)?,
            rate_socket_per_min: var_or("RATE_SOCKET_PER_MIN", d.rate_socket_per_min)?,
            request_timeout: secs_or("REQUEST_TIMEOUT_SECS", d.request_timeout)?,
            long_shift_hours: var_or("LONG_SHIFT_HOURS", d.long_shift_hours)?,
            counts_ttl: secs_or("COUNTS_TTL_SECS", d.counts_ttl)?,
            ws_heartbeat: secs_or("WS_HEARTBEAT_SECS", d.ws_heartbeat)?,
            ws_client_timeout: secs_or("WS_CLIENT_TIMEOUT_SECS", d.ws_client_timeout)?,
            ws_outbound_buffer: var_or("WS_OUTBOUND_BUFFER", d.ws_outbound_buffer)?,
            event_bus_capacity: var_or("EVENT_BUS_CAPACITY", d.event_bus_capacity)?,
            log_dir: var_or("LOG_DIR", d.log_dir)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if self.storage == StorageKind::MySql && self.database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE=mysql");
        }
        if self.rate_protected_per_min == 0 || self.rate_socket_per_min == 0 {
            bail!("rate limits must be greater than zero");
        }
        if self.ws_heartbeat.is_zero() || self.ws_client_timeout <= self.ws_heartbeat {
            bail!("WS_CLIENT_TIMEOUT_SECS must exceed a non-zero WS_HEARTBEAT_SECS");
        }
        if self.long_shift_hours <= 0.0 {
            bail!("LONG_SHIFT_HOURS must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            jwt_secret: "secret".into(),
            storage: StorageKind::Memory,
            ..Config::default()
        }
    }

    #[test]
    fn defaults_pass_validation_once_a_secret_is_set() {
        assert!(valid().validate().is_ok());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn mysql_needs_a_database_url() {
        let config = Config {
            storage: StorageKind::MySql,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn heartbeat_must_fit_inside_the_client_timeout() {
        let config = Config {
            ws_heartbeat: Duration::from_secs(30),
            ws_client_timeout: Duration::from_secs(30),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_kind_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("redis".parse::<StorageKind>().is_err());
    }
}
