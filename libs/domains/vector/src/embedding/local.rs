//! fastembed (ONNX) text encoder

use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use resource_lifecycle::{ResourceError, ResourceFactory};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use super::{EmbeddingConfig, TextEncoder};
use crate::error::{VectorError, VectorResult};

pub const EMBEDDING_RESOURCE: &str = "embedding-model";

/// A loaded fastembed model
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
}

impl TextEncoder for LocalEmbedder {
    fn encode(&self, texts: Vec<String>) -> VectorResult<Vec<Vec<f32>>> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model
            .embed(texts, None)
            .map_err(|e| VectorError::Embedding(e.to_string()))
    }
}

/// Loads the configured model weights on demand
pub struct FastEmbedLoader {
    config: EmbeddingConfig,
}

impl FastEmbedLoader {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResourceFactory<LocalEmbedder> for FastEmbedLoader {
    fn name(&self) -> &str {
        EMBEDDING_RESOURCE
    }

    async fn create(&self) -> Result<LocalEmbedder, ResourceError> {
        let model = self
            .config
            .model()
            .map_err(|e| ResourceError::init(EMBEDDING_RESOURCE, e))?;

        let mut options = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = &self.config.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        // Reading the ONNX weights is blocking file I/O plus session setup
        let embedding = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await
            .map_err(|e| ResourceError::init(EMBEDDING_RESOURCE, e))?
            .map_err(|e| ResourceError::init(EMBEDDING_RESOURCE, e))?;

        info!(model = %self.config.model_name, "Embedding model loaded");
        Ok(LocalEmbedder {
            model: Mutex::new(embedding),
        })
    }
}
