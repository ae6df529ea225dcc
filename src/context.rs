//! Startup wiring.
//!
//! [`AppContext::init`] is the single initialization point. Order:
//! settings, database provider, migrations, config store, legacy import,
//! then the cached configuration snapshot.

use crate::config::Settings;
use crate::db::{
    run_startup_migrations, Database, MigrationOutcome, MigrationRunner, SqlxMigrationRunner,
};
use crate::error::AppError;
use crate::store::{get_by_path, ConfigStore, LegacyImport, StoreError};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// In-memory copy of the configuration for synchronous lookups.
///
/// Not refreshed on its own; [`ConfigSnapshot::replace`] swaps the whole
/// document under the write lock.
#[derive(Debug)]
pub struct ConfigSnapshot {
    current: RwLock<Arc<Value>>,
}

impl ConfigSnapshot {
    pub fn new(document: Value) -> Self {
        ConfigSnapshot {
            current: RwLock::new(Arc::new(document)),
        }
    }

    pub fn current(&self) -> Arc<Value> {
        self.current.read().clone()
    }

    /// Value at a dotted path, e.g. `"ui.default_locale"`.
    pub fn get(&self, dotted_path: &str) -> Option<Value> {
        let document = self.current();
        get_by_path(&document, dotted_path).cloned()
    }

    pub fn replace(&self, document: Value) -> Arc<Value> {
        let document = Arc::new(document);
        *self.current.write() = document.clone();
        document
    }
}

/// Everything the rest of the application needs from this layer.
#[derive(Debug)]
pub struct AppContext {
    settings: Settings,
    db: Arc<Database>,
    store: ConfigStore,
    config: ConfigSnapshot,
    migrations: MigrationOutcome,
    legacy_import: LegacyImport,
}

impl AppContext {
    pub async fn init(settings: Settings) -> Result<Self, AppError> {
        Self::init_with_runner(settings, &SqlxMigrationRunner).await
    }

    pub async fn init_with_runner(
        settings: Settings,
        runner: &dyn MigrationRunner,
    ) -> Result<Self, AppError> {
        if settings.cors_allows_any() {
            warn!("CORS_ALLOW_ORIGIN IS SET TO '*' - NOT RECOMMENDED FOR PRODUCTION DEPLOYMENTS.");
        }

        let db = Arc::new(Database::connect(&settings.database)?);
        let migrations = run_startup_migrations(&db, runner, &settings.migrations_dir).await?;

        let store = ConfigStore::new(db.clone());
        let legacy_import = store.import_legacy_file(&settings.data_dir).await?;

        let config = ConfigSnapshot::new(store.load().await?);

        info!(
            database = db.is_enabled(),
            ?migrations,
            ?legacy_import,
            "Configuration store initialized"
        );

        Ok(AppContext {
            settings,
            db,
            store,
            config,
            migrations,
            legacy_import,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn migrations(&self) -> MigrationOutcome {
        self.migrations
    }

    pub fn legacy_import(&self) -> &LegacyImport {
        &self.legacy_import
    }

    /// Configuration as loaded at startup (or at the last refresh).
    pub fn config(&self) -> Arc<Value> {
        self.config.current()
    }

    pub fn config_value(&self, dotted_path: &str) -> Option<Value> {
        self.config.get(dotted_path)
    }

    /// Reload from the store and swap the cached document.
    pub async fn refresh_config(&self) -> Result<Arc<Value>, StoreError> {
        let document = self.store.load().await?;
        Ok(self.config.replace(document))
    }
}
