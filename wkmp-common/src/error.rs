//! Common error types for WKMP

use thiserror::Error;

/// Common result type for WKMP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the catalog model and configuration loading
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error in a configuration file
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Catalog object violates a model invariant
    #[error("Invalid catalog object: {0}")]
    InvalidObject(String),

    /// Unknown object type code
    #[error("Unknown object type: {0}")]
    UnknownObjectType(i64),
}
