use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::steps::DEFAULT_STEP_NAMES;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.json` is JSON; anything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Loading config from {}", path.display());
    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml if content.trim().is_empty() => Config::default(),
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };
    validate_config(&config)?;
    Ok(config)
}

/// `<config dir>/legal-markdown/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("legal-markdown").join("config.yaml"))
}

/// Loads the user config when one exists, defaults otherwise.
pub fn load_default_config() -> Result<Config, ConfigError> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(path),
        _ => Ok(Config::default()),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.pipeline.default_step_timeout_ms == Some(0) {
        return Err(ConfigError::Validation {
            message: "pipeline.default_step_timeout_ms must be greater than 0".to_string(),
        });
    }

    if config.headers.0.is_empty() {
        return Err(ConfigError::Validation {
            message: "headers must define at least one level format".to_string(),
        });
    }
    if let Some(i) = config.headers.0.iter().position(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: format!("header format for level {} is empty", i + 1),
        });
    }

    let filters = config
        .processing
        .only_steps
        .iter()
        .chain(&config.processing.skip_steps);
    for name in filters {
        if !DEFAULT_STEP_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::UnknownStep(name.clone()));
        }
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation {
            message: format!("Unknown log level: {}", config.logging.level),
        });
    }

    if config.batch.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "batch.worker_count must be at least 1".to_string(),
        });
    }

    Ok(())
}
