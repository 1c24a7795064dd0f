//! Error types for the AI toolkit
//!
//! The sense/decide core reports "nothing found" through `Option` and `bool`
//! returns; these errors cover configuration and pipeline bookkeeping.

use std::path::PathBuf;
use thiserror::Error;
use void_core::EntityId;

/// Result type for AI operations
pub type Result<T> = std::result::Result<T, AiError>;

/// Errors that can occur while configuring or driving the AI pipeline
#[derive(Debug, Error)]
pub enum AiError {
    /// IO error while reading configuration
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration text is not valid TOML for [`crate::config::AiConfig`]
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but holds out-of-range values
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// NPC already has a mind in the pipeline
    #[error("NPC {0} is already registered")]
    NpcAlreadyRegistered(EntityId),

    /// NPC has no mind in the pipeline
    #[error("NPC {0} is not registered")]
    NpcNotRegistered(EntityId),
}

impl AiError {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        AiError::InvalidConfig(message.into())
    }
}
