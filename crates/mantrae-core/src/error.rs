//! Error types for the reconciliation engine
//!
//! The variants follow the failure taxonomy of the engine: ownership
//! violations, transport/vendor failures, decode failures and configuration
//! problems, plus the storage and secret plumbing around them.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Existing records for a name are not provably owned by this system
    #[error("Records for {domain} are not managed by mantrae")]
    Ownership {
        /// The domain whose records blocked the mutation
        domain: String,
    },

    /// DNS vendor API errors
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// HTTP transport or status errors (proxy admin API, IP lookup)
    #[error("HTTP error: {0}")]
    Http(String),

    /// A response body could not be decoded into the expected structure
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors (missing provider, credentials, bad IP family)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Credential encryption/decryption errors
    #[error("Secret error: {0}")]
    Secret(String),

    /// Lookup found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an ownership violation error
    pub fn ownership(domain: impl Into<String>) -> Self {
        Self::Ownership {
            domain: domain.into(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a secret error
    pub fn secret(msg: impl Into<String>) -> Self {
        Self::Secret(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this error belongs to the configuration class.
    ///
    /// Configuration errors are surfaced to manual callers; undecryptable
    /// credentials count as missing credentials.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Secret(_))
    }

    /// Whether this error is an ownership violation
    pub fn is_ownership(&self) -> bool {
        matches!(self, Self::Ownership { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
