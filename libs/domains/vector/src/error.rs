use core_config::ConfigError;
use resource_lifecycle::ResourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error(transparent)]
    ResourceInit(#[from] ResourceError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index query error: {0}")]
    IndexQuery(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type VectorResult<T> = Result<T, VectorError>;

impl From<qdrant_client::QdrantError> for VectorError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        VectorError::IndexQuery(err.to_string())
    }
}

impl VectorError {
    /// Whether the failure came from loading a resource rather than using it
    pub fn is_resource_init(&self) -> bool {
        matches!(self, VectorError::ResourceInit(_))
    }
}
