use async_trait::async_trait;
use serde_json::json;
use sqlx::AnyConnection;
use sqlx::migrate::MigrateError;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use webui_config_store::db::{MigrationError, MigrationOutcome};
use webui_config_store::{AppContext, AppError, MigrationRunner, Settings};

struct BrokenRunner;

#[async_trait]
impl MigrationRunner for BrokenRunner {
    async fn run(&self, _conn: &mut AnyConnection, _dir: &Path) -> Result<(), MigrationError> {
        Err(MigrationError::Apply(MigrateError::VersionMissing(1)))
    }
}

fn settings_for(temp_dir: &TempDir) -> Settings {
    let mut env_map = HashMap::new();
    env_map.insert(
        "DATABASE_URL".to_string(),
        format!(
            "sqlite://{}",
            temp_dir.path().join("db").join("webui.db").to_string_lossy()
        ),
    );
    env_map.insert(
        "DATA_DIR".to_string(),
        temp_dir.path().to_string_lossy().to_string(),
    );
    env_map.insert(
        "CORS_ALLOW_ORIGIN".to_string(),
        "http://localhost:8080".to_string(),
    );
    Settings::from_env_map(env_map).unwrap()
}

#[tokio::test]
async fn test_init_imports_legacy_file_into_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("config.json"),
        r#"{"ui": {"default_locale": "pt-BR"}}"#,
    )
    .unwrap();

    let ctx = AppContext::init(settings_for(&temp_dir)).await.expect("init failed");

    assert!(ctx.database().is_enabled());
    assert_eq!(ctx.migrations(), MigrationOutcome::Applied);
    assert_eq!(ctx.config_value("ui.default_locale"), Some(json!("pt-BR")));
    assert!(temp_dir.path().join("old_config.json").exists());
    assert!(!temp_dir.path().join("config.json").exists());
}

#[tokio::test]
async fn test_snapshot_is_stale_until_refresh() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::init(settings_for(&temp_dir)).await.expect("init failed");
    assert_eq!(ctx.config_value("ui.default_locale"), Some(json!("")));

    ctx.store()
        .save(&json!({"ui": {"default_locale": "sv"}}))
        .await
        .unwrap();
    assert_eq!(ctx.config_value("ui.default_locale"), Some(json!("")));

    let refreshed = ctx.refresh_config().await.unwrap();
    assert_eq!(refreshed["ui"]["default_locale"], "sv");
    assert_eq!(ctx.config_value("ui.default_locale"), Some(json!("sv")));
}

#[tokio::test]
async fn test_migration_failure_aborts_startup() {
    let temp_dir = TempDir::new().unwrap();
    match AppContext::init_with_runner(settings_for(&temp_dir), &BrokenRunner).await {
        Err(AppError::Migration(MigrationError::Apply(_))) => {}
        other => panic!("Expected migration error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_malformed_legacy_file_aborts_startup() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("config.json"), "{").unwrap();

    let result = AppContext::init(settings_for(&temp_dir)).await;
    assert!(matches!(result, Err(AppError::Store(_))));
    assert!(temp_dir.path().join("config.json").exists());
}
