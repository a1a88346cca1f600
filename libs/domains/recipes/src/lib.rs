//! Recipes Domain
//!
//! Ingredient search and recipe recommendation over the vector domain.
//!
//! - [`SearchFilterEngine`]: query → embed → retrieve → rank → containment filter
//! - [`RecommendationProcessor`]: the stream job handler (search, generate, publish)
//! - [`RecipeIndexer`]: loads source recipes into the index
//!
//! # Pipeline
//!
//! ```text
//! recommendation.queue ──► StreamWorker ──► RecommendationProcessor
//!                                             │ search (EmbeddingGateway, IndexGateway)
//!                                             │ generate (RecipeGenerator)
//!                                             ▼
//!                                        response.queue
//! ```

pub mod error;
pub mod generator;
pub mod indexer;
pub mod models;
pub mod normalize;
pub mod processor;
pub mod query;
pub mod search;
pub mod streams;

pub use error::{RecipeError, RecipeResult};
pub use generator::{GeneratorConfig, OpenAiRecipeGenerator, RecipeGenerator};
pub use indexer::{DEFAULT_BATCH_SIZE, IndexReport, RecipeIndexer};
pub use models::{
    CandidateRecord, Ingredient, Recipe, RecipeMetadata, RecipeSummary, RecommendationJob,
    RecommendationResult, SourceRecipe, UserIngredient,
};
pub use processor::{JobOutcome, RecommendationProcessor};
pub use query::IngredientQuery;
pub use search::{SearchConfig, SearchFilterEngine};
pub use streams::RecommendationStream;
