//! Error handling for the material atlas pipeline
//!
//! Every fallible operation in the crate returns [`AtlasResult`]. Contract
//! violations by the caller (bad rectangles, mismatched buffer lengths, empty
//! glob patterns) surface immediately and are never retried. Expected outcomes
//! such as "no rule matched" or "page not tracked" are not errors and never
//! show up here.

use std::path::Path;

/// Main error type for the material atlas pipeline
#[derive(Debug, thiserror::Error)]
pub enum MaterialAtlasError {
    /// A required input is absent or a size/rectangle argument is malformed
    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// A rectangle exceeds its buffer or a buffer has the wrong length
    #[error("Out of range '{argument}': {reason}")]
    OutOfRange { argument: String, reason: String },

    /// A glob pattern could not be compiled
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error for {path}: {error}")]
    Io { path: String, error: String },

    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },

    #[error("Channel closed: {name}")]
    ChannelClosed { name: String },

    #[error("Failed to spawn thread '{name}': {error}")]
    ThreadSpawn { name: String, error: String },
}

/// Type alias for Results in the material atlas pipeline
pub type AtlasResult<T> = Result<T, MaterialAtlasError>;

impl MaterialAtlasError {
    pub fn invalid_argument(argument: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }

    pub fn out_of_range(argument: &str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, error: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for MaterialAtlasError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        MaterialAtlasError::ChannelClosed {
            name: "crossbeam".to_string(),
        }
    }
}
