pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod store;

pub use config::{DatabaseSettings, Settings};
pub use context::{AppContext, ConfigSnapshot};
pub use db::{Database, DatabaseKind, MigrationRunner, PoolStrategy, Session, SqlxMigrationRunner};
pub use error::AppError;
pub use store::{
    default_config, get_by_path, ConfigRecord, ConfigStore, LegacyImport, StoreError,
};
