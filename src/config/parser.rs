//! Configuration parser for loading `deckhand.yaml`.
//!
//! Configuration comes from a YAML file, optionally overridden by
//! environment variables, with a `.env` file loaded from the directory the
//! configuration lives in.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, DeckhandError, Result};

use super::spec::DeckhandConfig;

/// Environment variable overriding `application.code_root`.
pub const ENV_CODE_ROOT: &str = "DECKHAND_CODE_ROOT";

/// Environment variable overriding `application.environment`.
pub const ENV_ENVIRONMENT: &str = "DECKHAND_ENVIRONMENT";

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["deckhand.yaml", "deckhand.yml", ".deckhand.yaml"];

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for `.env` lookup and relative code roots.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// A relative `code_root` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeckhandConfig> {
        self.load_with(path.as_ref(), |_| None)
    }

    /// Reads, parses and overrides a configuration file, then resolves a
    /// relative `code_root`, so overridden roots resolve the same way.
    fn load_with(
        &self,
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<DeckhandConfig> {
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(DeckhandError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DeckhandError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut config = self.parse_yaml(&content, Some(path))?;
        Self::apply_env_overrides(&mut config, lookup);

        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf));
        if let Some(base) = base
            && config.application.code_root.is_relative()
        {
            config.application.code_root = base.join(&config.application.code_root);
        }

        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeckhandConfig> {
        debug!("Parsing YAML configuration");

        let config: DeckhandConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            DeckhandError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed configuration for application: {}",
            config.application.name
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// A relative `DECKHAND_CODE_ROOT` resolves like a relative `code_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeckhandConfig> {
        self.load_with(path.as_ref(), |name| std::env::var(name).ok())
    }

    /// Applies environment overrides read through `lookup`.
    fn apply_env_overrides(config: &mut DeckhandConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_CODE_ROOT) {
            debug!("Overriding application.code_root from environment");
            config.application.code_root = PathBuf::from(root);
        }

        if let Some(environment) = lookup(ENV_ENVIRONMENT) {
            debug!("Overriding application.environment from environment");
            config.application.environment = environment;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                DeckhandError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(DeckhandError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
