use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("read of {needed} bytes overruns buffer with {remaining} bytes remaining")]
    OutOfBounds { needed: usize, remaining: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
