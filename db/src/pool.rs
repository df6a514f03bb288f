//! Database connection pool management.

use std::str::FromStr;
use std::sync::Arc;

use log::LevelFilter;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::config::DbConfig;
use error::DatabaseError;

/// Type alias for PostgreSQL connection pool.
pub type DbPool = PgPool;

/// Parse a driver trace level string.
///
/// Accepts `trace`, `debug`, `info`, `warn`, `error` and `none`, in any case.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, DatabaseError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::Trace),
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        "none" => Ok(LevelFilter::Off),
        _ => Err(DatabaseError::InvalidLogLevel(level.to_string())),
    }
}

fn connect_options(config: &DbConfig) -> Result<PgConnectOptions, DatabaseError> {
    let level = parse_log_level(&config.log_level)?;

    // Only an explicit DSN is parsed; individual fields go straight into the
    // options so credentials are never re-read as URL syntax.
    let base = match &config.dsn {
        Some(dsn) => PgConnectOptions::from_str(dsn)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?,
        None => PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database),
    };

    let options = base
        .options([("standard_conforming_strings", "on")])
        .log_statements(level);

    Ok(options)
}

/// Create a new database connection pool.
///
/// Every new physical connection runs `config.session_init` before it is
/// handed out. The pool is pinged once before being returned.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, DatabaseError> {
    if config.min_connections > config.max_connections {
        return Err(DatabaseError::InvalidConfig(format!(
            "min_connections ({}) exceeds max_connections ({})",
            config.min_connections, config.max_connections
        )));
    }

    let options = connect_options(config)?;

    tracing::info!(
        "Creating database pool: {}:{}/{}",
        options.get_host(),
        options.get_port(),
        options.get_database().unwrap_or_default()
    );

    let session_init = Arc::new(config.session_init.clone());

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .max_lifetime(config.max_lifetime())
        .acquire_timeout(config.connect_timeout())
        .after_connect(move |conn, _meta| {
            let session_init = Arc::clone(&session_init);
            Box::pin(async move {
                for statement in session_init.iter() {
                    sqlx::query(statement.as_str())
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| {
                            tracing::error!("AfterConnect {} error: {}", statement, e);
                            e
                        })?;
                }
                Ok(())
            })
        })
        .connect_with(options)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database pool: {}", e);
            DatabaseError::ConnectionFailed(e.to_string())
        })?;

    health_check(&pool).await?;

    tracing::info!("Database pool created successfully");
    Ok(pool)
}

/// Check if the database connection is healthy.
pub async fn health_check(pool: &DbPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    Ok(())
}
