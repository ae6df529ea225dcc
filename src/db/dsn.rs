//! Database URL (DSN) classification and normalization.

use super::DbError;
use std::path::PathBuf;

/// Backend family a database URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// Embedded single-file (or in-memory) SQLite database.
    Sqlite,
    /// Networked PostgreSQL server.
    Postgres,
}

impl DatabaseKind {
    pub fn is_embedded(self) -> bool {
        matches!(self, DatabaseKind::Sqlite)
    }
}

/// Rewrite the short `postgres://` scheme to `postgresql://`.
pub fn normalize_database_url(url: &str) -> String {
    let url = url.trim();
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{}", rest),
        None => url.to_string(),
    }
}

/// Classify a (normalized) database URL by its scheme.
pub fn database_kind(url: &str) -> Result<DatabaseKind, DbError> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "sqlite" => Ok(DatabaseKind::Sqlite),
        "postgresql" | "postgres" => Ok(DatabaseKind::Postgres),
        other => Err(DbError::UnsupportedScheme(other.to_string())),
    }
}

/// Whether the URL names a private in-memory SQLite database.
pub fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Filesystem location of an embedded database, if it has one.
pub fn embedded_file_path(url: &str) -> Option<PathBuf> {
    if is_in_memory(url) {
        return None;
    }
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Have SQLite create a missing database file unless the URL picks a mode.
pub fn with_create_mode(url: &str) -> String {
    if embedded_file_path(url).is_none() || url.contains("mode=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}mode=rwc", url, separator)
}

/// Copy of the URL safe to write to logs.
pub fn redact(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("***")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
