//! Configuration management

use serde::{Deserialize, Serialize};

use crate::db::DbConfig;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default per-call deadline for remote requests in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 60;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/almapipo";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default number of identifiers processed at the same time.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Complete runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub alma: AlmaConfig,
    pub database: DbConfig,
    pub pipeline: PipelineConfig,
}

/// Remote service settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AlmaConfig {
    /// e.g. `https://api-eu.hosted.exlibrisgroup.com/almaws/v1`
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Institution suffix of Alma ids, e.g. `4161`; enables input validation
    pub institutional_suffix: Option<String>,
}

// The API key must not end up in logs
impl std::fmt::Debug for AlmaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlmaConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("institutional_suffix", &self.institutional_suffix)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub concurrency: usize,
    /// Mark PUT/POST as error when the response differs from what was sent
    pub strict_consistency: bool,
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> CoreResult<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            alma: AlmaConfig {
                base_url: std::env::var("ALMA_REST_API_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_default(),
                api_key: std::env::var("ALMA_REST_API_KEY").unwrap_or_default(),
                timeout_secs: env_or("ALMA_REST_API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS),
                institutional_suffix: std::env::var("ALMA_REST_ID_INSTITUTIONAL_SUFFIX")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
            },
            database: DbConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: Some(env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                )),
            },
            pipeline: PipelineConfig {
                concurrency: env_or("ALMAPIPO_CONCURRENCY", DEFAULT_CONCURRENCY),
                strict_consistency: env_or("ALMAPIPO_STRICT_CONSISTENCY", false),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the settings every command needs
    pub fn validate(&self) -> CoreResult<()> {
        if self.database.url.is_empty() {
            return Err(CoreError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(CoreError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(CoreError::config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.pipeline.concurrency == 0 {
            return Err(CoreError::config("ALMAPIPO_CONCURRENCY must be greater than 0"));
        }

        Ok(())
    }

    /// Validate the settings commands that talk to Alma need
    pub fn require_remote(&self) -> CoreResult<&AlmaConfig> {
        if self.alma.base_url.is_empty() {
            return Err(CoreError::config("ALMA_REST_API_BASE_URL is not set"));
        }
        if self.alma.api_key.is_empty() {
            return Err(CoreError::config("ALMA_REST_API_KEY is not set"));
        }
        Ok(&self.alma)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alma: AlmaConfig {
                base_url: String::new(),
                api_key: String::new(),
                timeout_secs: DEFAULT_API_TIMEOUT_SECS,
                institutional_suffix: None,
            },
            database: DbConfig::default(),
            pipeline: PipelineConfig {
                concurrency: DEFAULT_CONCURRENCY,
                strict_consistency: false,
            },
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
