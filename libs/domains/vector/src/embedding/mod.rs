//! Text → fixed-dimension vectors through a lazily loaded model.
//!
//! The model is held in a [`ManagedResource`]: every call leases it for the
//! duration of the computation only, so the weights are resident while a
//! request needs them and freed as soon as the last lease ends.

mod config;
mod local;

pub use config::{DEFAULT_MODEL_NAME, DEFAULT_VECTOR_DIMENSION, EmbeddingConfig};
pub use local::{EMBEDDING_RESOURCE, FastEmbedLoader, LocalEmbedder};

use async_trait::async_trait;
use resource_lifecycle::ManagedResource;
use tracing::{debug, warn};

use crate::error::{VectorError, VectorResult};

/// Synchronous, CPU-bound encoder living inside the managed resource
pub trait TextEncoder: Send + Sync + 'static {
    fn encode(&self, texts: Vec<String>) -> VectorResult<Vec<Vec<f32>>>;
}

/// Embedding seam used by search and indexing
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single query text
    async fn embed_query(&self, text: &str) -> VectorResult<Vec<f32>>;

    /// Embed many texts, one vector per input, in input order
    async fn embed_batch(&self, texts: Vec<String>) -> VectorResult<Vec<Vec<f32>>>;

    /// Configured output dimension
    fn dimension(&self) -> usize;

    /// Drop the model if no call is using it
    async fn unload(&self) -> bool;
}

/// [`Embedder`] over a managed [`TextEncoder`]
pub struct EmbeddingGateway<T> {
    model: ManagedResource<T>,
    dimension: usize,
}

impl<T: TextEncoder> EmbeddingGateway<T> {
    pub fn new(model: ManagedResource<T>, dimension: usize) -> Self {
        Self { model, dimension }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    async fn encode(&self, texts: Vec<String>) -> VectorResult<Vec<Vec<f32>>> {
        let expected = texts.len();
        let lease = self.model.acquire().await?;

        // The lease moves into the blocking task and is released there on
        // every exit path, including a panic inside the encoder.
        let vectors = tokio::task::spawn_blocking(move || lease.encode(texts))
            .await
            .map_err(|e| VectorError::Embedding(format!("encoder task failed: {}", e)))??;

        if vectors.len() != expected {
            return Err(VectorError::Embedding(format!(
                "expected {} vectors, model returned {}",
                expected,
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            warn!(
                expected = self.dimension,
                actual = bad.len(),
                "Embedding dimension mismatch"
            );
            return Err(VectorError::Embedding(format!(
                "vector dimension {} does not match configured {}",
                bad.len(),
                self.dimension
            )));
        }

        Ok(vectors)
    }
}

#[async_trait]
impl<T: TextEncoder> Embedder for EmbeddingGateway<T> {
    async fn embed_query(&self, text: &str) -> VectorResult<Vec<f32>> {
        debug!(chars = text.chars().count(), "Embedding query");
        self.encode(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| VectorError::Embedding("model returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> VectorResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "Embedding batch");
        self.encode(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn unload(&self) -> bool {
        self.model.unload().await
    }
}
