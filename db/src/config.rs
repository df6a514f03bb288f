//! Database configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use error::DatabaseError;

/// Session statement applied to every new physical connection by default.
pub const DEFAULT_DATESTYLE: &str = "SET datestyle = 'ISO, DMY'";

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Full connection string; overrides the individual fields when set
    pub dsn: Option<String>,
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Acquire timeout in seconds
    pub connect_timeout_secs: u64,
    /// Maximum lifetime of a physical connection in seconds
    pub max_lifetime_secs: u64,
    /// Driver statement log level: trace, debug, info, warn, error or none
    pub log_level: String,
    /// Statements executed on every new physical connection
    pub session_init: Vec<String>,
}

impl DbConfig {
    /// Create a new database configuration.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Create a configuration from a connection string.
    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        Self {
            dsn: Some(dsn.into()),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dsn) = std::env::var("DATABASE_URL") {
            config.dsn = Some(dsn);
        }

        if let Ok(host) = std::env::var("DB_HOST") {
            config.host = host;
        }

        if let Ok(port) = std::env::var("DB_PORT") {
            if let Ok(n) = port.parse() {
                config.port = n;
            }
        }

        if let Ok(database) = std::env::var("DB_NAME") {
            config.database = database;
        }

        if let Ok(username) = std::env::var("DB_USER") {
            config.username = username;
        }

        if let Ok(password) = std::env::var("DB_PASSWORD") {
            config.password = password;
        }

        if let Ok(max) = std::env::var("DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                config.max_connections = n;
            }
        }

        if let Ok(min) = std::env::var("DB_MIN_CONNECTIONS") {
            if let Ok(n) = min.parse() {
                config.min_connections = n;
            }
        }

        if let Ok(timeout) = std::env::var("DB_CONNECT_TIMEOUT_SECS") {
            if let Ok(n) = timeout.parse() {
                config.connect_timeout_secs = n;
            }
        }

        if let Ok(lifetime) = std::env::var("DB_MAX_LIFETIME_SECS") {
            if let Ok(n) = lifetime.parse() {
                config.max_lifetime_secs = n;
            }
        }

        if let Ok(level) = std::env::var("DB_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Set the maximum number of connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the minimum number of connections.
    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the acquire timeout.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn with_max_lifetime(mut self, secs: u64) -> Self {
        self.max_lifetime_secs = secs;
        self
    }

    /// Set the driver statement log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Replace the per-connection session statements.
    pub fn with_session_init<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session_init = statements.into_iter().map(Into::into).collect();
        self
    }

    /// Build the connection URL.
    ///
    /// Credentials and the database name are percent-encoded, so reserved
    /// characters in a password cannot change the target host.
    pub fn connection_url(&self) -> Result<String, DatabaseError> {
        if let Some(dsn) = &self.dsn {
            return Ok(dsn.clone());
        }

        let invalid = |what: &str| DatabaseError::InvalidConfig(format!("invalid {}", what));

        let mut url = Url::parse(&format!("postgres://{}:{}", self.host, self.port))
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;
        url.set_username(&self.username)
            .map_err(|_| invalid("username"))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("password"))?;
        }
        url.path_segments_mut()
            .map_err(|_| invalid("database"))?
            .push(&self.database);

        Ok(url.to_string())
    }

    /// Get acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get max connection lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            max_lifetime_secs: 3600,
            log_level: "warn".to_string(),
            session_init: vec![DEFAULT_DATESTYLE.to_string()],
        }
    }
}
