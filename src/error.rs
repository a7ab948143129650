//! Error types for the Runner Pool Operator

use thiserror::Error;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Secret error
    #[error("Secret error: {0}")]
    SecretError(String),
    /// Runner registry API error
    #[error("Runner registry error: {0}")]
    RegistryError(String),
    /// Runner registry rejected the token
    #[error("Runner registry rejected credentials: {0}")]
    RegistryUnauthorized(String),
    /// A reconcile pass exceeded its deadline
    #[error("Reconcile pass timed out after {0:?}")]
    Timeout(std::time::Duration),
}
