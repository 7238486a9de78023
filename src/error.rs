use std::io;

/// Crate-wide error type. Transient "would block" conditions are never
/// represented here — the reactor and connection layers check
/// `io::ErrorKind::WouldBlock` directly and never let them escape as `Error`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    DbPool(#[from] r2d2::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
