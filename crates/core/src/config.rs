//! Process configuration.
//!
//! Deserialized from a single YAML file at startup; field names are part of
//! the deployment contract and must not change. Defaults follow the
//! production deployment (pool 100/10/1h).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::RegionTag;
use crate::error::{Error, Result};

/// Key/value backing connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            enabled: false,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}/", self.password, self.host, self.port)
        }
    }
}

/// Read-side process settings. The tracker only consumes `log_level` and
/// `main_log_file`; the rest is parsed for the deployment contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub ssl_cert: String,
    pub ssl_key: String,
    pub log_level: String,
    pub main_log_file: String,
    pub access_log: String,
    pub access_log_path: String,
    pub enable_trust_proxy: bool,
    pub trust_proxies: Vec<String>,
    pub proxy_header: String,
}

/// Upstream game-data API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SekaiApiConfig {
    pub api_endpoint: String,
    pub api_token: String,
}

/// Database dialect selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbLoggerConfig {
    pub level: String,
    pub slow_threshold: String,
    pub ignore_record_not_found_error: bool,
    pub colorful: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbNamingConfig {
    pub table_prefix: String,
    pub singular_table: bool,
}

/// Per-region database settings (the `gorm_config` block).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub dialect: Option<Dialect>,
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: String,
    pub prepare_stmt: bool,
    pub logger: DbLoggerConfig,
    pub naming: DbNamingConfig,
    pub disable_fk_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dialect: None,
            dsn: String::new(),
            max_open_conns: 100,
            max_idle_conns: 10,
            conn_max_lifetime: "1h".to_string(),
            prepare_stmt: false,
            logger: DbLoggerConfig::default(),
            naming: DbNamingConfig::default(),
            disable_fk_migrate: false,
        }
    }
}

impl DatabaseConfig {
    /// Explicit dialect, falling back to the DSN scheme.
    pub fn resolved_dialect(&self) -> Result<Dialect> {
        if let Some(dialect) = self.dialect {
            return Ok(dialect);
        }
        if self.dsn.starts_with("mysql://") {
            Ok(Dialect::Mysql)
        } else if self.dsn.starts_with("postgres://") || self.dsn.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if self.dsn.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            Err(Error::config_invalid(format!(
                "cannot infer database dialect from dsn {:?}; set gorm_config.dialect",
                self.dsn
            )))
        }
    }

    pub fn max_lifetime(&self) -> Result<Duration> {
        parse_duration(&self.conn_max_lifetime)
    }
}

/// One region's tracker settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub master_data_dir: String,
    /// When true, `tracker_cron` carries a seconds field; otherwise a
    /// 5-field expression is accepted and normalized.
    pub use_second_level_tracker_cron: bool,
    pub tracker_cron: String,
    #[serde(rename = "gorm_config")]
    pub database: DatabaseConfig,
}

impl ServerConfig {
    /// Cron expression in 6-field (with seconds) form.
    pub fn cron_expression(&self) -> String {
        if self.use_second_level_tracker_cron {
            self.tracker_cron.clone()
        } else {
            format!("0 {}", self.tracker_cron.trim())
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub backend: BackendConfig,
    pub sekai_api: SekaiApiConfig,
    pub servers: HashMap<RegionTag, ServerConfig>,
}

impl AppConfig {
    /// Validate cross-field requirements before anything is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.sekai_api.api_endpoint.is_empty() {
            return Err(Error::config_invalid("sekai_api.api_endpoint is required"));
        }
        for (region, server) in self.servers.iter().filter(|(_, s)| s.enabled) {
            if server.master_data_dir.is_empty() {
                return Err(Error::config_invalid(format!(
                    "servers.{region}.master_data_dir is required"
                )));
            }
            if server.tracker_cron.is_empty() {
                return Err(Error::config_invalid(format!(
                    "servers.{region}.tracker_cron is required"
                )));
            }
            if server.database.enabled {
                if server.database.dsn.is_empty() {
                    return Err(Error::config_invalid(format!(
                        "servers.{region}.gorm_config.dsn is required"
                    )));
                }
                server.database.resolved_dialect()?;
                server.database.max_lifetime()?;
            }
        }
        Ok(())
    }

    /// Regions with both tracking and storage enabled, in canonical order.
    pub fn enabled_regions(&self) -> Vec<RegionTag> {
        RegionTag::ALL
            .iter()
            .copied()
            .filter(|r| {
                self.servers
                    .get(r)
                    .map(|s| s.enabled && s.database.enabled)
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Parse durations of the form `300s`, `5m`, `1h`, or bare seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::config_invalid("empty duration"));
    }
    let (value, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = value
        .parse()
        .map_err(|_| Error::config_invalid(format!("invalid duration: {raw:?}")))?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => {
            return Err(Error::config_invalid(format!(
                "invalid duration unit in {raw:?}"
            )))
        }
    };
    Ok(Duration::from_secs(secs))
}
