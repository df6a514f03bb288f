//! Database configuration and connection pooling.
//!
//! This crate bootstraps PostgreSQL connection pools using sqlx. Pools built
//! here are handed to `repo::PostgresRepo` as its reader and writer.

mod config;
mod pool;

pub use config::{DbConfig, DEFAULT_DATESTYLE};
pub use pool::{create_pool, health_check, parse_log_level, DbPool};

// Re-export sqlx types for convenience
pub use sqlx::{self, Postgres, Row};
