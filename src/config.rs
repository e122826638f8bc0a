//! Layered uploader configuration.
//!
//! Sources, lowest precedence first:
//! 1. `bulk-importer.toml` in the working directory (optional), or the file
//!    given with `--config` (required when given)
//! 2. `BULK_`-prefixed environment variables (`BULK_ENDPOINT`, `BULK_BATCH_SIZE`, ...)
//! 3. command-line flags

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File as ConfigFile};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::error::AppError;
use crate::grid::CleanedRow;
use crate::upload::{
    ApiCredentials, BatchSize, LoggingMode, OrchestratorSettings, DEFAULT_BATCH_SIZE,
    DEFAULT_LINK_COLUMN, DEFAULT_REQUEST_TIMEOUT,
};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "bulk-importer";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "BULK";

// ─────────────────────────────────────────────────────────────────────────────
// UploaderConfig
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Bulk validation/commit endpoint. Required for server passes only.
    pub endpoint: Option<String>,
    pub batch_size: usize,
    pub request_timeout_secs: u64,
    /// Columns forming the local duplicate key.
    pub key_columns: Vec<String>,
    pub link_column: String,
    /// Fields merged into every row sent to the server.
    pub extra_fields: CleanedRow,
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub logging_mode: LoggingMode,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            key_columns: Vec::new(),
            link_column: DEFAULT_LINK_COLUMN.to_string(),
            extra_fields: CleanedRow::new(),
            username: None,
            api_key: None,
            logging_mode: LoggingMode::default(),
        }
    }
}

impl fmt::Debug for UploaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderConfig")
            .field("endpoint", &self.endpoint)
            .field("batch_size", &self.batch_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("key_columns", &self.key_columns)
            .field("link_column", &self.link_column)
            .field("extra_fields", &self.extra_fields)
            .field("username", &self.username)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("logging_mode", &self.logging_mode)
            .finish()
    }
}

/// Command-line values layered over file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub batch_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub key_columns: Option<Vec<String>>,
    pub link_column: Option<String>,
    pub username: Option<String>,
}

impl UploaderConfig {
    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an explicit file is missing, a source
    /// cannot be parsed, or a value fails validation.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => ConfigFile::from(path).required(true),
            None => ConfigFile::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("key_columns"),
            )
            .set_override_option("endpoint", overrides.endpoint.clone())
            .and_then(|b| {
                b.set_override_option("batch_size", overrides.batch_size.map(|n| n as u64))
            })
            .and_then(|b| b.set_override_option("request_timeout_secs", overrides.request_timeout_secs))
            .and_then(|b| b.set_override_option("key_columns", overrides.key_columns.clone()))
            .and_then(|b| b.set_override_option("link_column", overrides.link_column.clone()))
            .and_then(|b| b.set_override_option("username", overrides.username.clone()))
            .and_then(|b| b.build())
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `AppError::Config` or `AppError::InvalidEndpoint` for the
    /// first invalid value.
    pub fn validate(&self) -> Result<(), AppError> {
        BatchSize::new(self.batch_size)?;
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.link_column.trim().is_empty() {
            return Err(AppError::Config("link_column must not be empty".to_string()));
        }
        if self.username.is_some() != self.api_key.is_some() {
            return Err(AppError::Config(
                "username and api_key must be set together".to_string(),
            ));
        }
        if self.endpoint.is_some() {
            self.endpoint_url()?;
        }
        Ok(())
    }

    /// Parsed endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no endpoint is configured and
    /// `AppError::InvalidEndpoint` when it does not parse as an HTTP(S) URL.
    pub fn endpoint_url(&self) -> Result<Url, AppError> {
        let raw = self
            .endpoint
            .as_deref()
            .ok_or_else(|| AppError::Config("endpoint is not set".to_string()))?;
        let url = Url::parse(raw).map_err(|e| AppError::InvalidEndpoint(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::InvalidEndpoint(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn credentials(&self) -> Option<ApiCredentials> {
        match (&self.username, &self.api_key) {
            (Some(username), Some(api_key)) => Some(ApiCredentials {
                username: username.clone(),
                api_key: SecretString::from(api_key.clone()),
            }),
            _ => None,
        }
    }

    /// # Errors
    ///
    /// Returns `AppError::Config` when the batch size is zero.
    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings, AppError> {
        Ok(OrchestratorSettings {
            batch_size: BatchSize::new(self.batch_size)?,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            key_columns: self.key_columns.clone(),
            link_column: self.link_column.clone(),
            extra_fields: self.extra_fields.clone(),
        })
    }
}
