//! Service configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use backend::BackendConfig;
use db::DbConfig;
use imagegen_core::{DEFAULT_MODEL, QueueConfig};
use storage::{StorageConfig, StorageError};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything needed to run the service.
///
/// | Env Var                         | Default                               |
/// |---------------------------------|---------------------------------------|
/// | `HOST`                          | `0.0.0.0`                             |
/// | `PORT`                          | `8000`                                |
/// | `API_KEYS`                      | empty: any non-empty key is accepted  |
/// | `DEFAULT_MODEL`                 | `stable-diffusion`                    |
/// | `GENERATION_ENDPOINT`           | `http://localhost:11434/api/generate` |
/// | `GENERATION_TIMEOUT_SECS`       | `60`                                  |
/// | `WORKER_CONCURRENCY`            | `4`                                   |
/// | `QUEUE_MAX_DELIVERIES`          | `3`                                   |
/// | `QUEUE_VISIBILITY_TIMEOUT_SECS` | `120`                                 |
/// | `QUEUE_MAX_SIZE`                | unbounded                             |
/// | `QUEUE_STATE_DIR`               | no snapshots                          |
///
/// Database and storage variables are read by [`DbConfig::from_env`] and
/// [`StorageConfig::from_env`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Accepted `X-API-KEY` values.
    pub api_keys: Vec<String>,
    pub default_model: String,
    pub backend: BackendConfig,
    pub queue: QueueConfig,
    pub queue_state_dir: Option<PathBuf>,
    pub db: DbConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_keys: Vec::new(),
            default_model: DEFAULT_MODEL.to_string(),
            backend: BackendConfig::default(),
            queue: QueueConfig::default(),
            queue_state_dir: None,
            db: DbConfig::default(),
            storage: StorageConfig::filesystem("./generated_images"),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_keys = var("API_KEYS")
            .map(|keys| {
                keys.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let backend = BackendConfig {
            endpoint: var("GENERATION_ENDPOINT").unwrap_or(defaults.backend.endpoint),
            timeout: Duration::from_secs(parse_or(
                "GENERATION_TIMEOUT_SECS",
                defaults.backend.timeout.as_secs(),
            )?),
        };

        let queue = QueueConfig {
            concurrency: parse_or("WORKER_CONCURRENCY", defaults.queue.concurrency)?,
            max_deliveries: parse_or("QUEUE_MAX_DELIVERIES", defaults.queue.max_deliveries)?,
            visibility_timeout_secs: parse_or(
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                defaults.queue.visibility_timeout_secs,
            )?,
            max_queue_size: parse_opt("QUEUE_MAX_SIZE")?,
            ..defaults.queue
        };
        if queue.concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".into(),
                reason: "at least one worker is required".into(),
            });
        }
        if queue.max_deliveries == 0 {
            return Err(ConfigError::Invalid {
                var: "QUEUE_MAX_DELIVERIES",
                value: "0".into(),
                reason: "every message needs at least one delivery".into(),
            });
        }

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            api_keys,
            default_model: var("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            backend,
            queue,
            queue_state_dir: var("QUEUE_STATE_DIR").map(PathBuf::from),
            db: DbConfig::from_env(),
            storage: StorageConfig::from_env()?,
        })
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings that are valid but unsafe for a real deployment.
    pub fn startup_warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.api_keys.is_empty() {
            warnings.push("API_KEYS is not set; any non-empty X-API-KEY is accepted");
        }
        if self.queue_state_dir.is_none() {
            warnings.push("QUEUE_STATE_DIR is not set; queued jobs are lost on restart");
        }
        warnings
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_opt<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(name)?.unwrap_or(default))
}
