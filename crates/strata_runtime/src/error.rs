//! # Runtime Error Types
//!
//! Configuration errors are fatal at startup: without a valid lane list
//! the barrier's participant set cannot be established.

use thiserror::Error;

/// Errors raised while validating or loading the lane configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The lane list has no lane named "Main".
    #[error("no lane named \"Main\" in lane configuration")]
    MissingMainLane,

    /// Two lanes share a name; the barrier participant set would be
    /// ambiguous.
    #[error("duplicate lane name \"{0}\"")]
    DuplicateLane(String),

    /// The configuration file could not be read.
    #[error("failed to read lane configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("failed to parse lane configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised while starting the tick runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The lane configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The OS refused to spawn a lane worker thread.
    #[error("failed to spawn lane thread: {0}")]
    Spawn(std::io::Error),
}
