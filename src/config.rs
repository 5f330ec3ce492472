//! Configuration module for pg-subscriber.
//!
//! This module provides configuration structures and utilities for loading
//! settings from environment variables. All configuration follows the 12-factor
//! app methodology.
//!
//! # Example
//!
//! ```rust,no_run
//! use pg_subscriber::Config;
//!
//! // Load from environment variables
//! let config = Config::from_env().expect("Failed to load config");
//!
//! // Access configuration values
//! println!("Connecting to PostgreSQL at {}:{}",
//!          config.postgres.host, config.postgres.port);
//! println!("Streaming publication: {}", config.postgres.publication);
//! ```

use crate::postgres::Lsn;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::env;

/// Main configuration structure containing all settings for pg-subscriber.
///
/// Configuration is organized into two sections:
/// - `postgres` - PostgreSQL connection, slot, and publication settings
/// - `replication` - Replication stream behavior and tuning parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub replication: ReplicationConfig,
}

/// PostgreSQL connection and replication configuration.
///
/// Contains all settings needed to establish a logical replication connection
/// to PostgreSQL and attach to the replication slot and publication.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub publication: String,
    pub slot_name: String,
    pub connect_timeout_secs: u64,
    pub ssl_mode: SslMode,
}

/// SSL/TLS connection mode for PostgreSQL.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            _ => Err(format!(
                "Invalid SSL mode: {s}. Valid values: disable, prefer, require"
            )),
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        };
        f.write_str(mode)
    }
}

/// Replication stream behavior and tuning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicationConfig {
    /// pgoutput protocol version. Only version 1 is supported.
    pub protocol_version: u32,
    /// Position to start streaming from; `0/0` defers to the slot's
    /// restart point.
    pub start_lsn: Lsn,
    /// Pass `messages 'true'` to the plugin so `pg_logical_emit_message`
    /// payloads are delivered.
    pub include_messages: bool,
    /// How often the example binary reports its position unprompted.
    pub status_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `PG_DATABASE` - PostgreSQL database name
    /// - `PG_USERNAME` - PostgreSQL username
    /// - `PG_PASSWORD` - PostgreSQL password
    ///
    /// Optional variables have sensible defaults. See the struct fields
    /// for documentation of all available options.
    ///
    /// # Errors
    ///
    /// Returns `Err` if required environment variables are missing or
    /// values cannot be parsed (e.g. an invalid port number or LSN).
    pub fn from_env() -> crate::Result<Self> {
        let postgres = PostgresConfig {
            host: env::var("PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("PG_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse::<u16>()
                .map_err(|_| Error::Config("PG_PORT must be a valid port number".to_string()))?,
            database: env::var("PG_DATABASE")
                .map_err(|_| Error::Config("PG_DATABASE is required".to_string()))?,
            username: env::var("PG_USERNAME")
                .map_err(|_| Error::Config("PG_USERNAME is required".to_string()))?,
            password: env::var("PG_PASSWORD")
                .map_err(|_| Error::Config("PG_PASSWORD is required".to_string()))?,
            publication: env::var("PG_PUBLICATION")
                .unwrap_or_else(|_| "pg_subscriber_pub".to_string()),
            slot_name: env::var("PG_SLOT_NAME")
                .unwrap_or_else(|_| "pg_subscriber_slot".to_string()),
            connect_timeout_secs: env::var("PG_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .unwrap_or(30),
            ssl_mode: env::var("PG_SSL_MODE")
                .unwrap_or_else(|_| "disable".to_string())
                .parse::<SslMode>()
                .map_err(Error::Config)?,
        };

        let replication = ReplicationConfig {
            protocol_version: env::var("REPLICATION_PROTOCOL_VERSION")
                .unwrap_or_else(|_| "1".to_string())
                .parse::<u32>()
                .unwrap_or(1),
            start_lsn: env::var("REPLICATION_START_LSN")
                .unwrap_or_else(|_| "0/0".to_string())
                .parse::<Lsn>()
                .map_err(|e| Error::Config(format!("REPLICATION_START_LSN: {e}")))?,
            include_messages: env::var("REPLICATION_INCLUDE_MESSAGES")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            status_interval_secs: env::var("REPLICATION_STATUS_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u64>()
                .unwrap_or(10),
        };

        Ok(Config {
            postgres,
            replication,
        })
    }

    /// Constructs a PostgreSQL connection URL for regular queries.
    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}&connect_timeout={}",
            self.postgres.username,
            self.postgres.password,
            self.postgres.host,
            self.postgres.port,
            self.postgres.database,
            self.postgres.ssl_mode,
            self.postgres.connect_timeout_secs,
        )
    }

    /// Constructs the connection URL for the replication session. The
    /// `replication=database` parameter switches the connection into the
    /// walsender protocol against this database.
    pub fn replication_url(&self) -> String {
        format!("{}&replication=database", self.postgres_url())
    }
}
