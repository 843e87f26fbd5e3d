//! Configuration module for Deckhand.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `deckhand.yaml`
//! - Environment overrides and `.env` loading
//! - Validation of configuration values and plans

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_CODE_ROOT, ENV_ENVIRONMENT, find_config_file,
};
pub use spec::{ApplicationConfig, DeckhandConfig, LayoutStrategy, ShellConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
