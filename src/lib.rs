//! # pg-subscriber
//!
//! A client-side logical replication consumer for PostgreSQL. It opens a
//! replication connection, drives the `START_REPLICATION` exchange, decodes
//! the `pgoutput` binary stream into structured change events, and reports
//! consumed positions back to the server so the replication slot advances.
//!
//! ## Overview
//!
//! `pg-subscriber` attaches to an existing logical replication slot and
//! publication and yields one decoded event per WAL frame:
//!
//! - **Pull-driven**: nothing is read from the socket until the consumer
//!   asks for the next event, so TCP flow control throttles the server
//! - **Bit-exact pgoutput v1 decoding**: begin/commit, relations, custom
//!   types, inserts, updates (including unchanged-TOAST reconstruction),
//!   deletes, truncates, and logical messages
//! - **Slot bookkeeping**: standby status updates move the server's
//!   flush and apply pointers forward
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pg_subscriber::{Config, Result, Subscriber};
//! use pg_subscriber::postgres::WalFrame;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration from environment variables
//!     let config = Config::from_env()?;
//!
//!     let mut subscriber = Subscriber::connect(&config).await?;
//!     subscriber.start().await?;
//!
//!     while let Some(frame) = subscriber.next_event().await? {
//!         if let WalFrame::WalData { change, .. } = frame {
//!             println!("{}: {:?}", change.kind(), change);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables. Required variables:
//!
//! - `PG_DATABASE` - PostgreSQL database name
//! - `PG_USERNAME` - PostgreSQL username
//! - `PG_PASSWORD` - PostgreSQL password
//!
//! See [`Config`] for all available options.
//!
//! ## PostgreSQL Setup
//!
//! 1. Enable logical replication in `postgresql.conf`:
//!    ```ini
//!    wal_level = logical
//!    max_replication_slots = 4
//!    max_wal_senders = 4
//!    ```
//!
//! 2. Create a publication for the tables you want to stream:
//!    ```sql
//!    CREATE PUBLICATION my_publication FOR TABLE users, orders;
//!    -- Or for all tables:
//!    -- CREATE PUBLICATION my_publication FOR ALL TABLES;
//!    ```
//!
//! 3. Create a replication user:
//!    ```sql
//!    CREATE USER replicator WITH REPLICATION LOGIN PASSWORD 'secret';
//!    GRANT CONNECT ON DATABASE mydb TO replicator;
//!    ```
//!
//! The slot itself can be created with `Subscriber::create_slot` (or
//! `pg_create_logical_replication_slot(..., 'pgoutput')` on the server).
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`subscriber`] - High-level consumer API: connect, iterate, acknowledge
//! - [`postgres`] - Replication session, wire envelope, and pgoutput decoding
//! - [`config`] - Configuration structures and parsing
//! - [`error`] - Error types and handling

/// Configuration structures and environment variable parsing
pub mod config;

/// Error types and result handling
pub mod error;

/// PostgreSQL replication session, wire protocol, and pgoutput decoding
pub mod postgres;

/// High-level consumer that pairs the session with the decoder
pub mod subscriber;

pub use config::Config;
pub use error::{Error, Result};
pub use subscriber::Subscriber;
