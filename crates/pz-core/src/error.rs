//! Error types for photo-z calibration

use thiserror::Error;

/// Calibration pipeline error type.
///
/// Only structural problems surface here. Statistical degeneracies (empty
/// populations, zero-mass densities, singular covariances) are reported as
/// [`crate::Degeneracy`] values on results instead.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller contract violation: shape mismatch, missing input, bad parameter
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::Configuration`] unless two lengths agree.
pub fn ensure_len(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::Configuration(format!(
            "{what}: expected length {expected}, got {actual}"
        )));
    }
    Ok(())
}
