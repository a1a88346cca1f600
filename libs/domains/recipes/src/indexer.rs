//! Populates the vector index from a JSON file of source recipes.

use domain_vector::{Embedder, UpsertOutcome, VectorIndex};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{RecipeError, RecipeResult};
use crate::models::{RecipeMetadata, SourceRecipe};
use crate::normalize::normalize_ingredients;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Counts reported after an indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub inserted: usize,
    pub updated: usize,
}

impl IndexReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

pub struct RecipeIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex<RecipeMetadata>>,
    batch_size: usize,
}

impl RecipeIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex<RecipeMetadata>>) -> Self {
        Self {
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Read a JSON array of `{ id, title, ingredients, steps }` records
    pub async fn load_file(path: impl AsRef<Path>) -> RecipeResult<Vec<SourceRecipe>> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RecipeError::Load(format!("{}: {}", path.display(), e)))?;

        serde_json::from_str(&raw)
            .map_err(|e| RecipeError::Load(format!("{}: {}", path.display(), e)))
    }

    pub async fn index_file(&self, path: impl AsRef<Path>) -> RecipeResult<IndexReport> {
        let recipes = Self::load_file(path).await?;
        self.index_recipes(recipes).await
    }

    /// Embed and upsert in batches; re-running over the same ids updates in place
    pub async fn index_recipes(&self, recipes: Vec<SourceRecipe>) -> RecipeResult<IndexReport> {
        let mut report = IndexReport::default();
        let total = recipes.len();

        for (batch_no, batch) in recipes.chunks(self.batch_size).enumerate() {
            let prepared: Vec<(String, RecipeMetadata)> = batch.iter().map(prepare).collect();
            let texts = prepared.iter().map(|(_, m)| embedding_text(m)).collect();

            let vectors = self.embedder.embed_batch(texts).await?;

            for ((id, metadata), vector) in prepared.iter().zip(vectors) {
                if metadata.ingredients.is_empty() {
                    warn!(id = %id, title = %metadata.title, "Recipe has no usable ingredient names");
                }
                let outcome = self.index.upsert(id, vector, metadata).await?;
                report.record(outcome);
            }

            debug!(batch = batch_no, done = report.total(), total, "Batch indexed");
        }

        info!(inserted = report.inserted, updated = report.updated, "Indexing finished");
        Ok(report)
    }
}

fn prepare(recipe: &SourceRecipe) -> (String, RecipeMetadata) {
    let metadata = RecipeMetadata {
        title: recipe.title.clone(),
        ingredients: normalize_ingredients(&recipe.ingredients),
        raw_ingredients: recipe.ingredients.clone(),
        steps: recipe.steps.clone(),
    };
    (recipe.id.clone(), metadata)
}

/// Title followed by the normalized ingredient names
fn embedding_text(metadata: &RecipeMetadata) -> String {
    std::iter::once(metadata.title.as_str())
        .chain(metadata.ingredients.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_vector::{MockEmbedder, MockVectorIndex, VectorError};
    use std::io::Write;

    fn source(id: &str, title: &str, ingredients: &[&str]) -> SourceRecipe {
        SourceRecipe {
            id: id.to_string(),
            title: title.to_string(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            steps: vec!["끓인다".to_string()],
        }
    }

    #[tokio::test]
    async fn test_batches_and_counts_outcomes() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_batch()
            .withf(|texts| texts.len() <= 2)
            .times(2)
            .returning(|texts| Ok(texts.iter().map(|_| vec![0.0; 3]).collect()));

        let mut index = MockVectorIndex::<RecipeMetadata>::new();
        index
            .expect_upsert()
            .withf(|_, vector, metadata| vector.len() == 3 && !metadata.ingredients.is_empty())
            .times(3)
            .returning(|id, _, _| {
                Ok(if id == "1" {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Inserted
                })
            });

        let indexer = RecipeIndexer::new(Arc::new(embedder), Arc::new(index)).with_batch_size(2);
        let report = indexer
            .index_recipes(vec![
                source("1", "제육볶음", &["돼지고기 200g"]),
                source("2", "두부조림", &["두부 1모", "간장 2큰술"]),
                source("3", "계란찜", &["계란 3개"]),
            ])
            .await
            .unwrap();

        assert_eq!(report, IndexReport { inserted: 2, updated: 1 });
    }

    #[test]
    fn test_prepare_normalizes_and_keeps_raw() {
        let (id, metadata) = prepare(&source("7", "된장찌개", &["된장 2큰술", "애호박(중) 1/2개"]));

        assert_eq!(id, "7");
        assert_eq!(metadata.ingredients, vec!["된장", "애호박"]);
        assert_eq!(metadata.raw_ingredients[1], "애호박(중) 1/2개");
        assert_eq!(embedding_text(&metadata), "된장찌개 된장 애호박");
    }

    #[tokio::test]
    async fn test_embedding_failure_stops_run() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_batch()
            .returning(|_| Err(VectorError::Embedding("out of memory".into())));
        let mut index = MockVectorIndex::<RecipeMetadata>::new();
        index.expect_upsert().never();

        let indexer = RecipeIndexer::new(Arc::new(embedder), Arc::new(index));
        let err = indexer
            .index_recipes(vec![source("1", "제육볶음", &["돼지고기"])])
            .await
            .unwrap_err();
        assert!(matches!(err, RecipeError::Search(_)));
    }

    #[tokio::test]
    async fn test_load_file() {
        let path = std::env::temp_dir().join(format!("recipes-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"id": 1, "title": "김치찌개", "ingredients": ["김치 1/4포기"], "steps": ["끓인다"]}}]"#
        )
        .unwrap();

        let recipes = RecipeIndexer::load_file(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].id, "1");

        let missing = RecipeIndexer::load_file("/nonexistent/recipes.json").await;
        assert!(matches!(missing, Err(RecipeError::Load(_))));
    }
}
