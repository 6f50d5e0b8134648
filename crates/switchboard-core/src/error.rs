/// Core error types for switchboard.
///
/// Provider failures are deliberately absent here: inside a routing run
/// adapters classify every transport outcome into
/// [`crate::types::ProviderFailure`], which is part of the result, not an
/// error.
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Usage store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Usage store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
