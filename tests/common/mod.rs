use pg_subscriber::config::{Config, PostgresConfig, ReplicationConfig, SslMode};
use std::env;
use tokio_postgres::{Client, NoTls};

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let postgres = PostgresConfig {
        host: env::var("TEST_PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_PG_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse()
            .unwrap_or(5432),
        database: env::var("TEST_PG_DATABASE").unwrap_or_else(|_| "postgres".to_string()),
        username: env::var("TEST_PG_USERNAME").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("TEST_PG_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        publication: format!("test_publication_{}", std::process::id()),
        slot_name: format!("test_slot_{}", std::process::id()),
        connect_timeout_secs: 30,
        ssl_mode: SslMode::Disable,
    };

    let replication = ReplicationConfig {
        protocol_version: 1,
        start_lsn: "0/0".parse().expect("valid LSN"),
        include_messages: false,
        status_interval_secs: 10,
    };

    Config {
        postgres,
        replication,
    }
}

/// Opens a regular (non-replication) connection for issuing test SQL.
pub async fn connect_sql(config: &Config) -> Client {
    let (client, connection) = tokio_postgres::connect(&config.postgres_url(), NoTls)
        .await
        .expect("failed to connect to test database");
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Creates a publication over all tables for this test run.
pub async fn create_publication(client: &Client, config: &Config) {
    let _ = client
        .simple_query(&format!(
            "DROP PUBLICATION IF EXISTS {}",
            config.postgres.publication
        ))
        .await;
    client
        .simple_query(&format!(
            "CREATE PUBLICATION {} FOR ALL TABLES",
            config.postgres.publication
        ))
        .await
        .expect("failed to create publication");
}

/// Drops the slot and publication created for this test run.
pub async fn cleanup(client: &Client, config: &Config) {
    let _ = client
        .simple_query(&format!(
            "SELECT pg_drop_replication_slot('{}')",
            config.postgres.slot_name
        ))
        .await;
    let _ = client
        .simple_query(&format!(
            "DROP PUBLICATION IF EXISTS {}",
            config.postgres.publication
        ))
        .await;
}
