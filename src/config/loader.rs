//! Configuration Loader
//!
//! Environment-aware loading: defaults, base TOML file, per-environment overlay,
//! then environment variables.

use super::error::ConfigResult;
use super::DecommissionConfig;
use ::config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DECOMMISSION";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_DIRECTORY: &str = "config";
const BASE_FILE_STEM: &str = "decommission";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: DecommissionConfig,
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
        Self::load_from_directory_with_env(config_dir, &environment, None)
    }

    /// Load configuration with an explicit environment name and, optionally, an
    /// explicit variable map standing in for the process environment.
    ///
    /// Passing the variables directly keeps tests from mutating global state.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory =
            config_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIRECTORY));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading decommission configuration"
        );

        let base_file = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let overlay_file = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        let config = Self::build(&[base_file, overlay_file], false, env_vars)?;
        config.validate()?;

        info!(
            environment = %environment,
            throughput_mbps = config.streaming.stream_throughput_outbound_megabits_per_sec,
            max_concurrent_transfers = config.streaming.max_concurrent_transfers,
            ledger = %config.ledger.path().display(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single explicit file on top of the defaults; the file must exist
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        let config = Self::build(&[path.to_path_buf()], true, None)?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: DecommissionConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from(DEFAULT_CONFIG_DIRECTORY),
        }))
    }

    fn build(
        files: &[PathBuf],
        required: bool,
        env_vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<DecommissionConfig> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&DecommissionConfig::default())?);

        for file in files {
            builder = builder.add_source(
                File::from(file.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env_vars),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Detect the deployment environment name
    pub fn detect_environment() -> String {
        std::env::var("DECOMMISSION_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    pub fn config(&self) -> &DecommissionConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}
