use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapSchedError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into SnapSchedError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cluster error: {0}")]
    Cluster(String), // Non-success responses from the search cluster

    #[error("Invalid schedule: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
