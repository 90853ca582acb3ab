//! Error types for wkmp-vl
//!
//! Every layer has its own error enum. None of them ever reach rule code:
//! the callback bridge folds placement errors into the `0` sentinel and the
//! classification session folds runtime faults into a failed report.

use thiserror::Error;
use wkmp_common::ObjectId;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer created the same container path first
    #[error("Concurrent create of container '{0}'")]
    Conflict(String),

    /// Persistence cannot serve requests right now
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    /// A reference names an object that is not in the catalog
    #[error("Reference target {0} does not exist")]
    MissingReference(ObjectId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] wkmp_common::Error),
}

/// Surface → object conversion failures
#[derive(Debug, Error)]
pub enum MarshalError {
    /// A required field is absent from the surface
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    /// The injected text converter rejected a value
    #[error("character conversion failed for '{field}': {reason}")]
    Conversion { field: String, reason: String },
}

/// Errors raised by a classification runtime while running rule code
#[derive(Debug, Error)]
pub enum RuntimeFault {
    /// Rule code raised an unhandled condition
    #[error("{runtime}: {message}")]
    Rule { runtime: String, message: String },

    /// Rule code panicked inside a native runtime
    #[error("rule code panicked: {0}")]
    Panicked(String),
}

impl RuntimeFault {
    pub fn rule(runtime: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeFault::Rule {
            runtime: runtime.into(),
            message: message.into(),
        }
    }
}

/// Why a single placement request produced no object
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("shutdown in progress")]
    Shutdown,

    /// The session that issued the callback has already ended
    #[error("callback used after its session ended")]
    BridgeClosed,

    /// The physical source object was reclaimed before the callback ran
    #[error("source object no longer exists")]
    SourceExpired,

    /// The physical source object is not (or no longer) in the catalog
    #[error("source object {0} not found in catalog")]
    SourceMissing(ObjectId),

    #[error("invalid chain: {0}")]
    InvalidChain(String),

    #[error("marshalling fault: {0}")]
    Marshal(#[from] MarshalError),

    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

impl PlacementError {
    /// Shutdown is reported separately from ordinary failures
    pub fn is_shutdown(&self) -> bool {
        matches!(self, PlacementError::Shutdown)
    }
}

/// Why a classification session ended in `Failed`
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("shutdown in progress")]
    Shutdown,

    #[error("runtime fault: {0}")]
    Runtime(#[from] RuntimeFault),
}
