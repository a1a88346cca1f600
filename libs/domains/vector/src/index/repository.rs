use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::VectorResult;

/// A stored point: caller-side string id, vector and JSON payload
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A similarity hit as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Storage operations against one collection.
///
/// This trait abstracts the underlying vector database (Qdrant).
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Nearest neighbours of `vector`, at most `limit`, in the store's order
    async fn search(&self, vector: Vec<f32>, limit: u64) -> VectorResult<Vec<ScoredPoint>>;

    /// Whether a point with this id is stored
    async fn exists(&self, id: &str) -> VectorResult<bool>;

    /// Insert or overwrite a point
    async fn upsert(&self, point: IndexPoint) -> VectorResult<()>;
}
