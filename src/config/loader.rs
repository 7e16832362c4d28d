//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered, later ones
//! winning:
//!
//! 1. Built-in defaults ([`DispatchConfig::default`])
//! 2. `{config_dir}/dispatch.toml` (optional)
//! 3. `{config_dir}/dispatch.{environment}.toml` (optional)
//! 4. `DISPATCH__SECTION__KEY` environment variables

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::DispatchConfig;

const BASE_FILE_NAME: &str = "dispatch";
const ENV_PREFIX: &str = "DISPATCH";
const ENV_SEPARATOR: &str = "__";

/// Loaded and validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: DispatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base = config_directory.join(format!("{BASE_FILE_NAME}.toml"));
        let overlay = config_directory.join(format!("{BASE_FILE_NAME}.{environment}.toml"));

        let builder = Self::defaults_builder(environment)?
            .add_source(Self::optional_toml(&base))
            .add_source(Self::optional_toml(&overlay))
            .add_source(Self::environment_source());

        let config = Self::build(builder, environment)?;

        info!(
            environment = %environment,
            poll_timeout_ms = config.consumer.poll_timeout_ms,
            ack_timeout_ms = config.producer.ack_timeout_ms,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single explicit file on top of the defaults
    ///
    /// Unlike directory loading, the file must exist.
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(path));
        }

        let environment = Self::detect_environment();
        let builder = Self::defaults_builder(&environment)?
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(Self::environment_source());
        let config = Self::build(builder, &environment)?;

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("DISPATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("DISPATCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn defaults_builder(
        environment: &str,
    ) -> ConfigResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Config::try_from(&DispatchConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;
        Ok(Config::builder().add_source(defaults))
    }

    fn optional_toml(path: &Path) -> File<config::FileSourceFile, FileFormat> {
        File::from(path).format(FileFormat::Toml).required(false)
    }

    fn environment_source() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        environment: &str,
    ) -> ConfigResult<DispatchConfig> {
        let config: DispatchConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        config.validate()?;
        Ok(config)
    }
}
