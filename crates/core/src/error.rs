//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A digest had the wrong decoded length.
    #[error("Invalid digest length: {0} bytes (must be 32)")]
    InvalidDigestLength(usize),

    /// A digest string was not valid hex.
    #[error("Invalid hex encoding")]
    InvalidHex,

    /// A DID identifier was empty or malformed.
    #[error("Invalid DID identifier: {0:?}")]
    InvalidDid(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
