pub mod loader;
pub mod schema;

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::secrets::{resolve_secret_optional, SecretError};

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    Config, ErrorPolicy, LogFormat, LoggingConfig, PipelineSettings, QueueConfig, ScoringConfig,
    TranscriptionConfig,
};

impl Config {
    /// Configured database path, or the per-user default.
    pub fn resolve_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => crate::db::default_database_path().ok_or_else(|| ConfigError::Validation {
                message: "No database_path configured and no home directory found".to_string(),
            }),
        }
    }
}

impl TranscriptionConfig {
    pub fn resolve_api_key(&self) -> Result<Option<SecretString>, SecretError> {
        resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env.as_deref(),
        )
    }
}

impl ScoringConfig {
    pub fn resolve_api_key(&self) -> Result<Option<SecretString>, SecretError> {
        resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env.as_deref(),
        )
    }
}
