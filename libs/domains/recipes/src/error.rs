//! Error types for the recipes domain.

use domain_vector::VectorError;
use stream_worker::StreamError;
use thiserror::Error;

/// Result type for recipe operations.
pub type RecipeResult<T> = Result<T, RecipeError>;

#[derive(Debug, Error)]
pub enum RecipeError {
    /// Embedding or index failure during a search
    #[error("Search error: {0}")]
    Search(#[from] VectorError),

    /// Generation failed, returned malformed output, or returned nothing
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Publish error: {0}")]
    Publish(String),

    /// Source data for indexing could not be read
    #[error("Index load error: {0}")]
    Load(String),
}

impl From<reqwest::Error> for RecipeError {
    fn from(err: reqwest::Error) -> Self {
        RecipeError::Generation(err.to_string())
    }
}

/// Pipeline failures reject the message; the broker's policy decides its fate.
impl From<RecipeError> for StreamError {
    fn from(e: RecipeError) -> Self {
        StreamError::transient(e.to_string())
    }
}
