use crate::config::ConfigError;
use crate::db::{DbError, MigrationError};
use crate::store::StoreError;
use thiserror::Error;

/// Startup failure of the persistence layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Config store error: {0}")]
    Store(#[from] StoreError),
}
