//! Recipe generation from the user's ingredients and retrieved candidates.

mod openai;
pub mod prompts;

pub use openai::{GeneratorConfig, OpenAiRecipeGenerator};

use async_trait::async_trait;

use crate::error::RecipeResult;
use crate::models::{RecipeSummary, RecommendationJob, RecommendationResult};

/// Generation collaborator.
///
/// `Ok(None)` means the model produced nothing usable; callers treat it as a
/// failure of the job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    async fn generate(
        &self,
        job: &RecommendationJob,
        candidates: &[RecipeSummary],
    ) -> RecipeResult<Option<RecommendationResult>>;
}
