//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Version string could not be parsed
    #[error("Invalid version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
