//! Startup schema migrations.

use super::{Database, DbError};
use async_trait::async_trait;
use sqlx::AnyConnection;
use sqlx::migrate::{MigrateError, Migrator};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to initialize the database connection: {0}")]
    Connection(#[source] DbError),
    #[error("Failed to load migrations: {0}")]
    Load(#[source] MigrateError),
    #[error("Failed to apply migrations: {0}")]
    Apply(#[source] MigrateError),
}

/// Applies the ordered migrations found in a directory.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn run(&self, conn: &mut AnyConnection, dir: &Path) -> Result<(), MigrationError>;
}

/// Runner backed by `sqlx::migrate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxMigrationRunner;

#[async_trait]
impl MigrationRunner for SqlxMigrationRunner {
    async fn run(&self, conn: &mut AnyConnection, dir: &Path) -> Result<(), MigrationError> {
        let migrator = Migrator::new(dir.to_path_buf())
            .await
            .map_err(MigrationError::Load)?;
        migrator.run_direct(conn).await.map_err(MigrationError::Apply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No database configured.
    Skipped,
    Applied,
}

/// Run migrations once at startup.
///
/// Failures propagate: the application must not start against a partially
/// migrated schema. The migration session is always closed before this
/// returns.
pub async fn run_startup_migrations(
    db: &Database,
    runner: &dyn MigrationRunner,
    dir: &Path,
) -> Result<MigrationOutcome, MigrationError> {
    let mut session = match db.open_session().await {
        Ok(Some(session)) => session,
        Ok(None) => {
            info!("No DATABASE_URL provided, skipping database migration");
            return Ok(MigrationOutcome::Skipped);
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize the database connection");
            return Err(MigrationError::Connection(e));
        }
    };

    info!(dir = %dir.display(), "Running database migrations...");
    let result = match session.connection() {
        Ok(conn) => runner.run(conn, dir).await,
        Err(e) => Err(MigrationError::Connection(e)),
    };

    let closed = session.close().await;
    assert!(session.is_closed(), "Database connection is still open.");

    if let Err(e) = result {
        error!(error = %e, "Database migration failed");
        return Err(e);
    }
    closed.map_err(MigrationError::Connection)?;

    info!("Migrations completed successfully");
    Ok(MigrationOutcome::Applied)
}
