//! Persistent JSON configuration store.
//!
//! The `config` table holds a single authoritative row with the fixed key
//! `id = 1`. Saves upsert that row inside one transaction, so concurrent
//! writers can never leave more than one row behind. Every operation opens
//! its own session and degrades to defaults/no-ops when no database is
//! configured.

pub mod defaults;
pub mod path;

pub use defaults::default_config;
pub use path::get_by_path;

use crate::db::{Database, DbError, Session};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{Connection, Row};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Primary key of the authoritative configuration row.
pub const CONFIG_ROW_ID: i64 = 1;

/// Pre-database configuration file, relative to the data directory.
pub const LEGACY_CONFIG_FILE: &str = "config.json";

/// Name the legacy file is renamed to once imported.
pub const CONSUMED_CONFIG_FILE: &str = "old_config.json";

// `updated_at` is read through COALESCE plus a flag; the Any driver cannot
// decode a NULL BIGINT even into an Option.
const SELECT_LATEST: &str = r#"
    SELECT id, data, version, created_at,
           COALESCE(updated_at, 0) AS updated_at_ms,
           CAST(CASE WHEN updated_at IS NULL THEN 0 ELSE 1 END AS BIGINT) AS is_updated
    FROM config
    ORDER BY id DESC
    LIMIT 1
"#;

const DELETE_STRAY_ROWS: &str = "DELETE FROM config WHERE id <> $1";

const UPSERT_CONFIG: &str = r#"
    INSERT INTO config (id, data, version, created_at)
    VALUES ($1, $2, 0, $3)
    ON CONFLICT (id) DO UPDATE SET data = excluded.data, updated_at = $4
"#;

const DELETE_ALL: &str = "DELETE FROM config";

/// The stored configuration row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigRecord {
    pub id: i64,
    pub data: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Stored configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Stored timestamp out of range: {0}")]
    Timestamp(i64),
    #[error("Failed to read legacy config {path}: {source}")]
    LegacyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Legacy config {path} is not valid JSON: {source}")]
    LegacyParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Legacy config {path} is not a JSON object")]
    LegacyNotObject { path: PathBuf },
    #[error("Failed to rename legacy config {from} to {to}: {source}")]
    LegacyRename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of the one-time legacy file import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyImport {
    /// No legacy file present.
    NotFound,
    /// File saved to the database and renamed to `renamed_to`.
    Imported { renamed_to: PathBuf },
    /// File left in place because no database is configured.
    Deferred { path: PathBuf },
}

/// Load/save/reset access to the configuration row.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    db: Arc<Database>,
}

impl ConfigStore {
    pub fn new(db: Arc<Database>) -> Self {
        ConfigStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Current configuration document.
    ///
    /// Falls back to [`default_config`] when no database is configured or
    /// no row has been stored yet. Never inserts a row.
    pub async fn load(&self) -> Result<Value, StoreError> {
        let Some(mut session) = self.db.open_session().await? else {
            warn!("No database connection. Returning default configuration.");
            return Ok(default_config());
        };

        let record = fetch_latest(&mut session).await;
        let closed = session.close().await;
        let record = record?;
        closed?;

        Ok(record.map(|r| r.data).unwrap_or_else(default_config))
    }

    /// The authoritative row, if one exists.
    pub async fn record(&self) -> Result<Option<ConfigRecord>, StoreError> {
        let Some(mut session) = self.db.open_session().await? else {
            return Ok(None);
        };

        let record = fetch_latest(&mut session).await;
        let closed = session.close().await;
        let record = record?;
        closed?;
        Ok(record)
    }

    /// Store `document` as the configuration.
    ///
    /// Inserts the row with version 0 on first save, otherwise overwrites
    /// `data` and stamps `updated_at`. Saving the same document twice is
    /// harmless.
    pub async fn save(&self, document: &Value) -> Result<(), StoreError> {
        let Some(mut session) = self.db.open_session().await? else {
            warn!("No database connection. Configuration not saved.");
            return Ok(());
        };

        let result = upsert(&mut session, document).await;
        let closed = session.close().await;
        result?;
        closed?;

        debug!("Configuration saved");
        Ok(())
    }

    /// Delete every stored configuration row.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let Some(mut session) = self.db.open_session().await? else {
            warn!("No database connection. Configuration reset skipped.");
            return Ok(());
        };

        let result = delete_all(&mut session).await;
        let closed = session.close().await;
        let removed = result?;
        closed?;

        info!(rows = removed, "Configuration reset");
        Ok(())
    }

    /// Import `<data_dir>/config.json` once, then rename it to
    /// `<data_dir>/old_config.json`.
    ///
    /// A malformed file is an error. Without a database the file is left in
    /// place so a later start with a database can still import it.
    pub async fn import_legacy_file(&self, data_dir: &Path) -> Result<LegacyImport, StoreError> {
        let source = data_dir.join(LEGACY_CONFIG_FILE);

        let raw = match tokio::fs::read_to_string(&source).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LegacyImport::NotFound),
            Err(e) => {
                return Err(StoreError::LegacyRead {
                    path: source,
                    source: e,
                })
            }
        };

        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                return Err(StoreError::LegacyParse {
                    path: source,
                    source: e,
                })
            }
        };
        if !document.is_object() {
            return Err(StoreError::LegacyNotObject { path: source });
        }

        if !self.db.is_enabled() {
            warn!(
                path = %source.display(),
                "No database connection. Legacy configuration left in place."
            );
            return Ok(LegacyImport::Deferred { path: source });
        }

        self.save(&document).await?;

        let target = data_dir.join(CONSUMED_CONFIG_FILE);
        if let Err(e) = tokio::fs::rename(&source, &target).await {
            return Err(StoreError::LegacyRename {
                from: source,
                to: target,
                source: e,
            });
        }

        info!(
            from = %source.display(),
            to = %target.display(),
            "Imported legacy configuration file"
        );
        Ok(LegacyImport::Imported { renamed_to: target })
    }
}

async fn fetch_latest(session: &mut Session) -> Result<Option<ConfigRecord>, StoreError> {
    let row = sqlx::query(SELECT_LATEST)
        .fetch_optional(session.connection()?)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

async fn upsert(session: &mut Session, document: &Value) -> Result<(), StoreError> {
    let data = serde_json::to_string(document)?;
    let now = Utc::now().timestamp_millis();

    let mut tx = session.connection()?.begin().await?;

    // Rows written under another key are collapsed into the single row.
    sqlx::query(DELETE_STRAY_ROWS)
        .bind(CONFIG_ROW_ID)
        .execute(&mut *tx)
        .await?;

    sqlx::query(UPSERT_CONFIG)
        .bind(CONFIG_ROW_ID)
        .bind(data)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn delete_all(session: &mut Session) -> Result<u64, StoreError> {
    let mut tx = session.connection()?.begin().await?;
    let result = sqlx::query(DELETE_ALL).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

fn record_from_row(row: &AnyRow) -> Result<ConfigRecord, StoreError> {
    let data: String = row.try_get("data")?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at = match row.try_get::<i64, _>("is_updated")? {
        0 => None,
        _ => Some(from_millis(row.try_get("updated_at_ms")?)?),
    };

    Ok(ConfigRecord {
        id: row.try_get("id")?,
        data: serde_json::from_str(&data)?,
        version: row.try_get("version")?,
        created_at: from_millis(created_at)?,
        updated_at,
    })
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(StoreError::Timestamp(ms))
}
