//! Recommendation processor for stream workers.
//!
//! Implements `StreamProcessor<RecommendationJob>`: search for candidate
//! recipes, generate a recommendation from them, publish it to the reply
//! stream. Acknowledgement is left to the worker, which acks only when
//! `process` returns `Ok`.

use async_trait::async_trait;
use std::sync::Arc;
use stream_worker::{MessagePublisher, StreamError, StreamProcessor};
use tracing::{info, warn};

use crate::error::{RecipeError, RecipeResult};
use crate::generator::RecipeGenerator;
use crate::models::{RecommendationJob, RecommendationResult};
use crate::search::SearchFilterEngine;

/// How a job ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The result was published under this message id
    Published { message_id: String, recipes: usize },
    /// Search found nothing; nothing was published
    NoCandidates,
}

pub struct RecommendationProcessor {
    engine: Arc<SearchFilterEngine>,
    generator: Arc<dyn RecipeGenerator>,
    publisher: Arc<dyn MessagePublisher>,
}

impl RecommendationProcessor {
    pub fn new(
        engine: Arc<SearchFilterEngine>,
        generator: Arc<dyn RecipeGenerator>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            engine,
            generator,
            publisher,
        }
    }

    pub fn engine(&self) -> &Arc<SearchFilterEngine> {
        &self.engine
    }

    /// Search, then generate.
    ///
    /// `Ok(None)` when there are no candidates. A generator that returns
    /// nothing is a [`RecipeError::Generation`].
    pub async fn recommend(&self, job: &RecommendationJob) -> RecipeResult<Option<RecommendationResult>> {
        let candidates = self.engine.search(&job.query()).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        match self.generator.generate(job, &candidates).await? {
            Some(result) => Ok(Some(result)),
            None => Err(RecipeError::Generation(
                "generator returned no recommendation".to_string(),
            )),
        }
    }

    /// Run one job end to end, publishing the result if there is one
    pub async fn handle(&self, job: &RecommendationJob) -> RecipeResult<JobOutcome> {
        let Some(result) = self.recommend(job).await? else {
            info!(query = %job.query(), "No matching recipes, nothing to publish");
            return Ok(JobOutcome::NoCandidates);
        };

        let body = serde_json::to_string(&result)
            .map_err(|e| RecipeError::Publish(format!("failed to encode result: {}", e)))?;
        let message_id = self
            .publisher
            .publish(&body)
            .await
            .map_err(|e| RecipeError::Publish(e.to_string()))?;

        Ok(JobOutcome::Published {
            message_id,
            recipes: result.recipes.len(),
        })
    }
}

#[async_trait]
impl StreamProcessor<RecommendationJob> for RecommendationProcessor {
    async fn process(&self, job: &RecommendationJob) -> Result<(), StreamError> {
        info!(ingredients = job.items.len(), "Processing recommendation job");

        match self.handle(job).await {
            Ok(JobOutcome::Published { message_id, recipes }) => {
                info!(
                    message_id = %message_id,
                    destination = %self.publisher.destination(),
                    recipes,
                    "Recommendation published"
                );
                Ok(())
            }
            Ok(JobOutcome::NoCandidates) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Recommendation job failed");
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "RecommendationProcessor"
    }

    async fn shutdown(&self) {
        self.engine.release().await;
    }
}
