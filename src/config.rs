use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Process settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub data_dir: PathBuf,
    pub migrations_dir: PathBuf,
    pub cors_allow_origins: Vec<String>,
}

/// Connection settings for the database provider.
///
/// `url` is `None` when `DATABASE_URL` is unset or empty, which puts the
/// provider into degraded mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_timeout: Duration,
    pub pool_recycle: Duration,
}

impl DatabaseSettings {
    /// Settings for the given URL with the stock pool options.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 0,
            max_overflow: 0,
            pool_timeout: Duration::from_secs(30),
            pool_recycle: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let url = env_map
            .get("DATABASE_URL")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let database = DatabaseSettings {
            url,
            pool_size: parse_u32(&env_map, "DATABASE_POOL_SIZE", 0)?,
            max_overflow: parse_u32(&env_map, "DATABASE_POOL_MAX_OVERFLOW", 0)?,
            pool_timeout: Duration::from_secs(parse_u64(&env_map, "DATABASE_POOL_TIMEOUT", 30)?),
            pool_recycle: Duration::from_secs(parse_u64(
                &env_map,
                "DATABASE_POOL_RECYCLE",
                3600,
            )?),
        };

        let data_dir = env_map
            .get("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let migrations_dir = env_map
            .get("MIGRATIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_migrations_dir);

        let cors_allow_origins = parse_cors_origins(
            env_map
                .get("CORS_ALLOW_ORIGIN")
                .map(|s| s.as_str())
                .unwrap_or("*"),
        )?;

        Ok(Settings {
            database,
            data_dir,
            migrations_dir,
            cors_allow_origins,
        })
    }

    /// Whether the origin list allows every origin.
    pub fn cors_allows_any(&self) -> bool {
        self.cors_allow_origins.iter().any(|o| o == "*")
    }
}

/// Migration definitions shipped with the crate.
pub fn default_migrations_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn parse_u32(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match env_map.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                "must be a non-negative integer".to_string(),
            )
        }),
        None => Ok(default),
    }
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a number of seconds".to_string())
        }),
        None => Ok(default),
    }
}

fn parse_cors_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let origins: Vec<String> = raw
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    for origin in origins.iter().filter(|o| o.as_str() != "*") {
        validate_cors_origin(origin)?;
    }

    Ok(origins)
}

/// Accept only absolute `http`/`https` origins with a host.
pub fn validate_cors_origin(origin: &str) -> Result<(), ConfigError> {
    let invalid =
        |reason: String| ConfigError::InvalidValue("CORS_ALLOW_ORIGIN".to_string(), reason);

    let parsed = url::Url::parse(origin)
        .map_err(|_| invalid(format!("invalid URL structure in '{}'", origin)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "invalid scheme in '{}', only 'http' and 'https' are allowed",
            origin
        )));
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(invalid(format!("invalid URL structure in '{}'", origin))),
    }
}
