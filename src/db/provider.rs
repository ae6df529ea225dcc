//! Connection provider: pool selection and scoped sessions.

use super::dsn::{
    database_kind, embedded_file_path, normalize_database_url, redact, with_create_mode,
    DatabaseKind,
};
use super::DbError;
use crate::config::DatabaseSettings;
use sqlx::any::{Any, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{AnyConnection, AnyPool, Connection};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How connections are managed for a configured database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    /// One shared connection to an embedded database file.
    Embedded,
    /// Bounded pool with overflow, acquire timeout and periodic recycle.
    Bounded {
        size: u32,
        max_overflow: u32,
        timeout: Duration,
        recycle: Duration,
    },
    /// A fresh physical connection per session.
    Unpooled,
}

impl PoolStrategy {
    pub fn select(kind: DatabaseKind, settings: &DatabaseSettings) -> Self {
        if kind.is_embedded() {
            PoolStrategy::Embedded
        } else if settings.pool_size > 0 {
            PoolStrategy::Bounded {
                size: settings.pool_size,
                max_overflow: settings.max_overflow,
                timeout: settings.pool_timeout,
                recycle: settings.pool_recycle,
            }
        } else {
            PoolStrategy::Unpooled
        }
    }
}

enum Backend {
    Pooled(AnyPool),
    Unpooled,
}

struct Connected {
    url: String,
    kind: DatabaseKind,
    strategy: PoolStrategy,
    backend: Backend,
}

/// Process-wide database handle.
///
/// Built once at startup. Without a database URL it runs in degraded mode
/// and [`Database::open_session`] yields `None`.
pub struct Database {
    inner: Option<Connected>,
}

impl Database {
    /// Database handle that never hands out sessions.
    pub fn disabled() -> Self {
        Database { inner: None }
    }

    /// Build the provider from settings. Physical connections are opened
    /// lazily on first use.
    pub fn connect(settings: &DatabaseSettings) -> Result<Self, DbError> {
        let Some(raw_url) = settings.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            warn!("No DATABASE_URL provided, running without a database");
            return Ok(Self::disabled());
        };

        sqlx::any::install_default_drivers();

        let url = with_create_mode(&normalize_database_url(raw_url));
        let kind = database_kind(&url)?;
        let strategy = PoolStrategy::select(kind, settings);

        if let Some(path) = embedded_file_path(&url) {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
        }

        let backend = match strategy {
            PoolStrategy::Embedded => Backend::Pooled(
                AnyPoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_lazy(&url)?,
            ),
            PoolStrategy::Bounded {
                size,
                max_overflow,
                timeout,
                recycle,
            } => Backend::Pooled(
                AnyPoolOptions::new()
                    .max_connections(size.saturating_add(max_overflow).max(1))
                    .min_connections(0)
                    .acquire_timeout(timeout)
                    .idle_timeout(recycle)
                    .max_lifetime(recycle)
                    .test_before_acquire(true)
                    .connect_lazy(&url)?,
            ),
            PoolStrategy::Unpooled => Backend::Unpooled,
        };

        info!(url = %redact(&url), ?kind, ?strategy, "Database provider configured");

        Ok(Database {
            inner: Some(Connected {
                url,
                kind,
                strategy,
                backend,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn kind(&self) -> Option<DatabaseKind> {
        self.inner.as_ref().map(|c| c.kind)
    }

    pub fn strategy(&self) -> Option<PoolStrategy> {
        self.inner.as_ref().map(|c| c.strategy)
    }

    /// Normalized URL with any password masked.
    pub fn url(&self) -> Option<String> {
        self.inner.as_ref().map(|c| redact(&c.url))
    }

    /// Acquire a scoped session.
    ///
    /// Returns `Ok(None)` in degraded mode. Callers must close the session
    /// (or drop it) on every path.
    pub async fn open_session(&self) -> Result<Option<Session>, DbError> {
        let Some(connected) = &self.inner else {
            debug!("Skipping session creation as DATABASE_URL is not set");
            return Ok(None);
        };

        let session = match &connected.backend {
            Backend::Pooled(pool) => Session::pooled(pool.acquire().await?),
            Backend::Unpooled => {
                let mut conn = AnyConnection::connect(&connected.url).await?;
                conn.ping().await?;
                Session::direct(conn)
            }
        };

        Ok(Some(session))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.url())
            .field("kind", &self.kind())
            .field("strategy", &self.strategy())
            .finish()
    }
}

enum SessionConnection {
    Pooled(PoolConnection<Any>),
    Direct(AnyConnection),
}

/// A database session released exactly once.
///
/// Pooled sessions return their connection to the pool; unpooled sessions
/// close the physical connection. Closing twice is a no-op. Dropping an open
/// pooled session still returns its connection, but an unpooled one is torn
/// down without the graceful close handshake.
pub struct Session {
    conn: Option<SessionConnection>,
}

impl Session {
    fn pooled(conn: PoolConnection<Any>) -> Self {
        Session {
            conn: Some(SessionConnection::Pooled(conn)),
        }
    }

    fn direct(conn: AnyConnection) -> Self {
        Session {
            conn: Some(SessionConnection::Direct(conn)),
        }
    }

    /// Connection backing this session.
    pub fn connection(&mut self) -> Result<&mut AnyConnection, DbError> {
        match self.conn.as_mut() {
            Some(SessionConnection::Pooled(conn)) => Ok(&mut **conn),
            Some(SessionConnection::Direct(conn)) => Ok(conn),
            None => Err(DbError::SessionClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Release the session. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), DbError> {
        match self.conn.take() {
            Some(SessionConnection::Pooled(conn)) => {
                drop(conn);
                Ok(())
            }
            Some(SessionConnection::Direct(conn)) => {
                conn.close().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_some() {
            debug!("Session dropped without explicit close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str, pool_size: u32) -> DatabaseSettings {
        DatabaseSettings {
            pool_size,
            max_overflow: 3,
            ..DatabaseSettings::with_url(url)
        }
    }

    #[test]
    fn test_strategy_embedded_ignores_pool_size() {
        let s = settings("sqlite::memory:", 10);
        assert_eq!(
            PoolStrategy::select(DatabaseKind::Sqlite, &s),
            PoolStrategy::Embedded
        );
    }

    #[test]
    fn test_strategy_bounded_for_positive_pool_size() {
        let s = settings("postgresql://db/webui", 4);
        match PoolStrategy::select(DatabaseKind::Postgres, &s) {
            PoolStrategy::Bounded {
                size, max_overflow, ..
            } => {
                assert_eq!(size, 4);
                assert_eq!(max_overflow, 3);
            }
            other => panic!("Expected Bounded, got {:?}", other),
        }
    }

    #[test]
    fn test_strategy_unpooled_for_zero_pool_size() {
        let s = settings("postgresql://db/webui", 0);
        assert_eq!(
            PoolStrategy::select(DatabaseKind::Postgres, &s),
            PoolStrategy::Unpooled
        );
    }

    #[tokio::test]
    async fn test_disabled_yields_no_session() {
        let db = Database::connect(&DatabaseSettings::default()).unwrap();
        assert!(!db.is_enabled());
        assert!(db.open_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unpooled_postgres_is_lazy_and_normalized() {
        let db =
            Database::connect(&settings("postgres://webui:pw@127.0.0.1:1/webui", 0)).unwrap();
        assert_eq!(db.kind(), Some(DatabaseKind::Postgres));
        assert_eq!(db.strategy(), Some(PoolStrategy::Unpooled));
        let url = db.url().unwrap();
        assert!(url.starts_with("postgresql://"));
        assert!(!url.contains("pw"));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_rejected() {
        match Database::connect(&DatabaseSettings::with_url("mssql://db/webui")) {
            Err(DbError::UnsupportedScheme(s)) => assert_eq!(s, "mssql"),
            other => panic!("Expected UnsupportedScheme, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_session_close_is_idempotent() {
        let db = Database::connect(&DatabaseSettings::with_url("sqlite::memory:")).unwrap();
        let mut session = db.open_session().await.unwrap().expect("session");
        assert!(!session.is_closed());

        let one: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(session.connection().unwrap())
            .await
            .unwrap();
        assert_eq!(one.0, 1);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(session.connection(), Err(DbError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_embedded_pool_reuses_single_connection() {
        let db = Database::connect(&DatabaseSettings::with_url("sqlite::memory:")).unwrap();

        let mut first = db.open_session().await.unwrap().unwrap();
        sqlx::query("CREATE TABLE marker (v BIGINT)")
            .execute(first.connection().unwrap())
            .await
            .unwrap();
        first.close().await.unwrap();

        let mut second = db.open_session().await.unwrap().unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM marker")
            .fetch_one(second.connection().unwrap())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        second.close().await.unwrap();
    }
}
