//! Configuration Loader
//!
//! Layers an optional configuration file (TOML, YAML or JSON, chosen by
//! extension) and `COMMAND_CORE__*` environment variables over the defaults,
//! then validates the result.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::CommandCoreConfig;
use crate::constants::env;
use crate::logging::get_environment;

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: CommandCoreConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from an optional file plus the environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> ConfigResult<Self> {
        let environment = get_environment();
        let source_path = path.map(|path| path.as_ref().to_path_buf());

        let mut builder = config::Config::builder();

        if let Some(path) = &source_path {
            if !path.exists() {
                return Err(ConfigurationError::file_not_found(path.clone()));
            }
            debug!(
                "Loading configuration for environment '{}' from file: {}",
                environment,
                path.display()
            );
            builder = builder.add_source(config::File::from(path.clone()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env::CONFIG_PREFIX)
                .separator(env::CONFIG_SEPARATOR)
                .try_parsing(true),
        );

        let config: CommandCoreConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(Self {
            config,
            environment,
            source_path,
        })
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: CommandCoreConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: get_environment(),
            source_path: None,
        })
    }

    pub fn config(&self) -> &CommandCoreConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Effective configuration as JSON
    pub fn debug_config(&self) -> ConfigResult<serde_json::Value> {
        serde_json::to_value(&self.config)
            .map_err(|e| ConfigurationError::json_serialization_error("debug_config", e))
    }
}
