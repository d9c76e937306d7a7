//! Error types for iPXE script generation

use thiserror::Error;

/// Error type for iPXE operations
#[derive(Debug, Error)]
pub enum IpxeError {
    /// Missing required configuration
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
}

/// Result type for iPXE operations
pub type Result<T> = std::result::Result<T, IpxeError>;
