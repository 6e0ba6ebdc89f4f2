//! Service configuration loaded from a YAML file.
//!
//! The file is read once at startup via [`AppConfig::load`] (or
//! [`AppConfig::discover`], which also searches parent directories). After
//! `dotenvy::dotenv()` has run, `LISTEN_ADDR` overrides the `web` section.
//!
//! ```yaml
//! web:
//!   ip: 0.0.0.0
//!   port: 8080
//! log:
//!   info:
//!     filename: ./storage/info.log
//!   error:
//!     filename: ./storage/error.log
//!     rotation: daily
//!     max_files: 30
//! database:
//!   primary: { host: localhost, user: app, password: secret, port: 5432, database: app }
//!   replicas:
//!     - { host: replica-1, user: app, password: secret, port: 5432, database: app }
//! sql_log:
//!   slow_threshold_ms: 200
//!   level: info
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::db::sql_logger::{LogLevel, LoggerConfig};
use crate::error::AppError;

/// Directories searched by [`AppConfig::discover`], nearest first.
const SEARCH_DIRS: [&str; 5] = ["./", "../", "../../", "../../../", "../../../../"];

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub web: WebConfig,
    /// Log sink settings.
    pub log: LogConfig,
    /// Primary/replica connection set and pool limits.
    pub database: DatabaseConfig,
    /// SQL trace logger settings.
    pub sql_log: SqlLogConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to bind.
    pub ip: String,
    /// Port to bind.
    pub port: u16,
    /// `Prod` disables verbose request tracing.
    pub run_mode: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 8080,
            run_mode: "Dev".to_string(),
        }
    }
}

impl WebConfig {
    /// Returns `true` when running in production mode.
    #[must_use]
    pub fn is_prod(&self) -> bool {
        self.run_mode.eq_ignore_ascii_case("prod")
    }

    /// Resolves the socket address, honouring a `LISTEN_ADDR` override.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the address cannot be parsed.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        let raw = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| format!("{}:{}", self.ip, self.port));
        raw.parse()
            .map_err(|e| AppError::Config(format!("invalid listen address {raw:?}: {e}")))
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Include DEBUG lines in the info file.
    pub debug: bool,
    /// Destination for lines below ERROR.
    pub info: LogFile,
    /// Destination for ERROR lines.
    pub error: LogFile,
}

impl LogConfig {
    /// Returns `true` when at least one log file is configured.
    #[must_use]
    pub fn writes_files(&self) -> bool {
        !self.info.filename.is_empty() || !self.error.filename.is_empty()
    }
}

/// A single rotating log file. An empty filename disables the file.
///
/// With rotation enabled, the period is inserted before the extension:
/// `info.log` becomes `info.2026-10-16.log`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogFile {
    /// Path of the log file; parent directories are created on startup.
    pub filename: String,
    /// How often a new file is started.
    pub rotation: LogRotation,
    /// Rotated files kept on disk; older ones are deleted. `0` keeps all.
    pub max_files: usize,
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            filename: String::new(),
            rotation: LogRotation::Daily,
            max_files: 30,
        }
    }
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// One file per hour.
    Hourly,
    /// One file per day.
    #[default]
    Daily,
    /// A single file that grows forever.
    Never,
}

/// Connection set: one primary and any number of read replicas.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Writable primary.
    pub primary: ConnectionDescriptor,
    /// Read-only replicas.
    pub replicas: Vec<ConnectionDescriptor>,
    /// Pool limits applied to every target.
    pub pool: PoolLimits,
}

/// Where and how to reach one database target.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionDescriptor {
    /// Full connection URL; when set, the remaining fields are ignored.
    pub url: Option<String>,
    /// Server host.
    pub host: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            port: 5432,
            database: "postgres".to_string(),
        }
    }
}

impl ConnectionDescriptor {
    /// Builds the connection URL, percent-encoding the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the host or credentials cannot form
    /// a valid URL.
    pub fn connection_url(&self) -> Result<String, AppError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let base = format!("postgres://{}:{}/{}", self.host, self.port, self.database);
        let mut url = url::Url::parse(&base)
            .map_err(|e| AppError::Config(format!("invalid database host {:?}: {e}", self.host)))?;
        url.set_username(&self.user)
            .map_err(|()| AppError::Config(format!("invalid database user {:?}", self.user)))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|()| AppError::Config("invalid database password".to_string()))?;
        }
        Ok(url.into())
    }

    /// Connection URL with the password masked, for log output.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self.connection_url() {
            Ok(raw) => match url::Url::parse(&raw) {
                Ok(mut url) if url.password().is_some() => {
                    let _ = url.set_password(Some("***"));
                    url.into()
                }
                _ => raw,
            },
            Err(_) => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Pool limits applied to every target in the connection set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolLimits {
    /// Idle connections older than this are closed.
    pub max_idle_time_secs: u64,
    /// Connections older than this are closed.
    pub max_lifetime_secs: u64,
    /// Upper bound on open connections per target.
    pub max_open_conns: u32,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_idle_time_secs: 60 * 60,
            max_lifetime_secs: 24 * 60 * 60,
            max_open_conns: 200,
        }
    }
}

impl PoolLimits {
    /// Maximum idle lifetime.
    #[must_use]
    pub const fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_secs)
    }

    /// Maximum total lifetime.
    #[must_use]
    pub const fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

/// SQL trace logger settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqlLogConfig {
    /// Statements slower than this are logged at warn level. `0` disables.
    pub slow_threshold_ms: u64,
    /// Minimum level.
    pub level: LogLevel,
    /// Do not report "record not found" at error level.
    pub ignore_record_not_found: bool,
    /// Use ANSI-colored templates. Ignored when log files are configured.
    pub colorful: bool,
    /// Log statements with `$N` placeholders instead of the bound values.
    pub parameterized_queries: bool,
}

impl Default for SqlLogConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 200,
            level: LogLevel::Info,
            ignore_record_not_found: false,
            colorful: true,
            parameterized_queries: false,
        }
    }
}

impl From<&SqlLogConfig> for LoggerConfig {
    fn from(cfg: &SqlLogConfig) -> Self {
        Self {
            slow_threshold: Duration::from_millis(cfg.slow_threshold_ms),
            level: cfg.level,
            ignore_record_not_found: cfg.ignore_record_not_found,
            colorful: cfg.colorful,
            parameterized_queries: cfg.parameterized_queries,
        }
    }
}

impl AppConfig {
    /// Reads and parses the YAML file at `path`.
    ///
    /// Calls `dotenvy::dotenv().ok()` first so a `.env` file can supply
    /// the environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    /// Parses configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] on malformed YAML.
    pub fn from_yaml(raw: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Loads `path` directly if it exists, otherwise searches for its file
    /// name in the current directory and up to four parents. Returns the
    /// configuration together with the file it came from.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if no candidate exists or the file
    /// found cannot be parsed.
    pub fn discover(path: impl AsRef<Path>) -> Result<(Self, PathBuf), AppError> {
        let path = path.as_ref();
        let found = find_config(path)
            .ok_or_else(|| AppError::Config(format!("config file {} not found", path.display())))?;
        let config = Self::load(&found)?;
        Ok((config, found))
    }

    /// SQL logger settings. Colors are turned off when log files are
    /// configured, since the same lines are written to them.
    #[must_use]
    pub fn sql_logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            colorful: self.sql_log.colorful && !self.log.writes_files(),
            ..LoggerConfig::from(&self.sql_log)
        }
    }
}

/// Returns the first existing candidate for `path`.
fn find_config(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let name = path.file_name()?;
    SEARCH_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.is_file())
}
