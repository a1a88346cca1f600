//! Vector Domain Library
//!
//! Embedding and similarity search for the recommender, each behind a lazily
//! managed heavyweight resource.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────┐
//! │ EmbeddingGateway │        │   IndexGateway   │  ← acquire on entry,
//! │   (Embedder)     │        │  (VectorIndex<M>) │    release on exit
//! └────────┬─────────┘        └────────┬─────────┘
//!          │ ManagedResource           │ ManagedResource
//! ┌────────▼─────────┐        ┌────────▼─────────┐
//! │  LocalEmbedder   │        │ QdrantRepository │
//! │   (fastembed)    │        │ (VectorRepository)│
//! └──────────────────┘        └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_vector::{
//!     Embedder, EmbeddingConfig, EmbeddingGateway, FastEmbedLoader, IndexGateway,
//!     QdrantConfig, QdrantConnector, VectorIndex,
//! };
//! use resource_lifecycle::ManagedResource;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Doc { title: String }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let embedding = EmbeddingConfig::default();
//! let embedder = EmbeddingGateway::new(
//!     ManagedResource::new(FastEmbedLoader::new(embedding.clone())),
//!     embedding.dimension,
//! );
//! let index: IndexGateway<_, Doc> = IndexGateway::new(
//!     ManagedResource::new(QdrantConnector::new(QdrantConfig::default())),
//!     embedding.dimension,
//! );
//!
//! let vector = embedder.embed_query("돼지고기 양파").await?;
//! let matches = index.query(vector, 10).await?;
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod index;
pub mod qdrant;

pub use embedding::{
    Embedder, EmbeddingConfig, EmbeddingGateway, FastEmbedLoader, LocalEmbedder, TextEncoder,
};
pub use error::{VectorError, VectorResult};
pub use index::{
    IndexGateway, IndexMatch, IndexPoint, ScoredPoint, UpsertOutcome, VectorIndex,
    VectorRepository,
};
pub use qdrant::{QdrantConfig, QdrantConnector, QdrantRepository};

#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbedder;
#[cfg(any(test, feature = "mock"))]
pub use index::{MockVectorIndex, MockVectorRepository};
