//! Free-text ingredient query → ranked, filtered recipe list.

use core_config::{ConfigError, FromEnv, env_parse};
use domain_vector::{Embedder, IndexMatch, VectorIndex};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RecipeResult;
use crate::models::{CandidateRecord, RecipeMetadata, RecipeSummary};
use crate::normalize::normalize_ingredients;
use crate::query::IngredientQuery;

pub const DEFAULT_TOP_K: u64 = 500;
pub const DEFAULT_MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Nearest neighbours fetched from the index per search
    pub top_k: u64,
    /// Cap on the filtered list handed back
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl FromEnv for SearchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            top_k: env_parse("DEFAULT_TOP_K", DEFAULT_TOP_K)?,
            max_results: env_parse("SEARCH_MAX_RESULTS", DEFAULT_MAX_RESULTS)?,
        };

        if config.top_k == 0 {
            return Err(ConfigError::invalid("DEFAULT_TOP_K", "must be greater than 0"));
        }
        if config.max_results == 0 {
            return Err(ConfigError::invalid("SEARCH_MAX_RESULTS", "must be greater than 0"));
        }

        Ok(config)
    }
}

/// Embeds the query, retrieves neighbours, ranks and filters them
pub struct SearchFilterEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex<RecipeMetadata>>,
    config: SearchConfig,
}

impl SearchFilterEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex<RecipeMetadata>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Recipes containing every queried ingredient, best match first.
    ///
    /// An empty list means nothing matched; it is not an error.
    pub async fn search(&self, raw_query: &str) -> RecipeResult<Vec<RecipeSummary>> {
        let query = IngredientQuery::parse(raw_query);
        debug!(ingredients = ?query.ingredients(), "Preprocessed query");

        let vector = self.embedder.embed_query(&query.embedding_text()).await?;
        let matches = self.index.query(vector, self.config.top_k).await?;
        let retrieved = matches.len();

        let mut candidates: Vec<CandidateRecord> = matches.into_iter().map(candidate).collect();
        // sort_by is stable: equal scores keep retrieval order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let results: Vec<RecipeSummary> = candidates
            .into_iter()
            .filter(|c| query.matches(&c.ingredient_names))
            .take(self.config.max_results)
            .map(RecipeSummary::from)
            .collect();

        info!(retrieved, retained = results.len(), "Search completed");
        Ok(results)
    }

    /// Unload the model and close the index connection if idle
    pub async fn release(&self) {
        let model = self.embedder.unload().await;
        let index = self.index.unload().await;
        debug!(model, index, "Search resources released");
    }
}

fn candidate(found: IndexMatch<RecipeMetadata>) -> CandidateRecord {
    let metadata = found.metadata;
    let ingredient_names = if metadata.ingredients.is_empty() {
        normalize_ingredients(&metadata.raw_ingredients)
    } else {
        metadata.ingredients
    };

    CandidateRecord {
        id: found.id,
        title: metadata.title,
        raw_ingredients: metadata.raw_ingredients,
        steps: metadata.steps,
        score: found.score,
        ingredient_names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecipeError;
    use domain_vector::{MockEmbedder, MockVectorIndex, VectorError};

    fn recipe(id: &str, score: f32, title: &str, raw: &[&str]) -> IndexMatch<RecipeMetadata> {
        let raw_ingredients: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        IndexMatch {
            id: id.to_string(),
            score,
            metadata: RecipeMetadata {
                title: title.to_string(),
                ingredients: normalize_ingredients(&raw_ingredients),
                raw_ingredients,
                steps: vec!["조리한다".to_string()],
            },
        }
    }

    fn engine_with(matches: Vec<IndexMatch<RecipeMetadata>>) -> SearchFilterEngine {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_query()
            .returning(|_| Ok(vec![0.1, 0.2, 0.3]));

        let mut index = MockVectorIndex::<RecipeMetadata>::new();
        index
            .expect_query()
            .returning(move |_, _| Ok(matches.clone()));

        SearchFilterEngine::new(Arc::new(embedder), Arc::new(index), SearchConfig::default())
    }

    #[tokio::test]
    async fn test_embeds_space_joined_segments_with_top_k() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_query()
            .withf(|text| text == "돼지고기 양파")
            .times(1)
            .returning(|_| Ok(vec![0.0; 3]));

        let mut index = MockVectorIndex::<RecipeMetadata>::new();
        index
            .expect_query()
            .withf(|_, top_k| *top_k == 500)
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let engine =
            SearchFilterEngine::new(Arc::new(embedder), Arc::new(index), SearchConfig::default());
        assert!(engine.search("돼지고기, 양파").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retains_full_match_ranked_first() {
        let engine = engine_with(vec![
            recipe("2", 0.70, "양파볶음", &["양파 1개"]),
            recipe("1", 0.92, "제육볶음", &["돼지고기 100g", "양파 1개", "고추장 2큰술"]),
            recipe("3", 0.80, "돼지고기 수육", &["돼지고기 500g", "된장 1큰술"]),
        ]);

        let results = engine.search("돼지고기, 양파").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "1");
        assert_eq!(results[0].title, "제육볶음");
        assert_eq!(results[0].ingredients[0], "돼지고기 100g");
    }

    #[tokio::test]
    async fn test_equal_scores_keep_retrieval_order() {
        let engine = engine_with(vec![
            recipe("a", 0.5, "첫번째", &["양파 1개"]),
            recipe("b", 0.9, "두번째", &["양파 2개"]),
            recipe("c", 0.5, "세번째", &["적양파 1개"]),
            recipe("d", 0.5, "네번째", &["양파 반개"]),
        ]);

        let ids: Vec<String> = engine
            .search("양파")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["b", "a", "c", "d"]);
    }

    #[tokio::test]
    async fn test_no_overlap_is_empty_not_error() {
        let engine = engine_with(vec![
            recipe("1", 0.9, "제육볶음", &["돼지고기 100g", "양파 1개"]),
            recipe("2", 0.8, "된장찌개", &["된장 2큰술", "두부 1모"]),
        ]);

        assert!(engine.search("치즈").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_candidate_without_ingredients_is_dropped() {
        let engine = engine_with(vec![recipe("1", 0.9, "이름만", &[])]);
        assert!(engine.search("양파").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_ingredients_used_when_names_missing() {
        let mut found = recipe("1", 0.9, "양파전", &["양파 1개", "부침가루 1컵"]);
        found.metadata.ingredients.clear();
        let engine = engine_with(vec![found]);

        assert_eq!(engine.search("양파").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_tracks_overlap() {
        let pool = vec![
            recipe("0", 0.9, "r0", &["감자 1개"]),
            recipe("1", 0.8, "r1", &["감자 1개", "당근 1개"]),
            recipe("2", 0.7, "r2", &["감자 1개", "당근 1개", "양파 1개"]),
        ];

        for (query, expected) in [
            ("감자", vec!["0", "1", "2"]),
            ("감자, 당근", vec!["1", "2"]),
            ("감자, 당근, 양파", vec!["2"]),
            ("감자, 당근, 양파, 마늘", vec![]),
        ] {
            let engine = engine_with(pool.clone());
            let ids: Vec<String> = engine
                .search(query)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, expected, "query: {}", query);
        }
    }

    #[tokio::test]
    async fn test_filter_matches_subset_rule_for_generated_pools() {
        // no name is a substring of another, so containment reduces to set inclusion
        const NAMES: [&str; 6] = ["감자", "당근", "양파", "마늘", "Tofu", "BACON"];
        let names_of = |mask: u32| -> Vec<String> {
            NAMES
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, name)| name.to_string())
                .collect()
        };

        let mut seed: u32 = 0x2545_f491;
        let mut next_mask = || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) % (1 << NAMES.len())
        };

        for round in 0..4 {
            let masks: Vec<u32> = (0..20).map(|_| next_mask()).collect();
            let pool: Vec<IndexMatch<RecipeMetadata>> = masks
                .iter()
                .enumerate()
                .map(|(i, &mask)| IndexMatch {
                    id: i.to_string(),
                    score: 1.0 - i as f32 / 100.0,
                    metadata: RecipeMetadata {
                        title: format!("r{}", i),
                        ingredients: names_of(mask),
                        raw_ingredients: names_of(mask).iter().map(|n| format!("{} 1개", n)).collect(),
                        steps: vec![],
                    },
                })
                .collect();

            for query_mask in 1..(1u32 << NAMES.len()) {
                let query = names_of(query_mask)
                    .iter()
                    .map(|n| n.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(", ");
                let expected: Vec<String> = masks
                    .iter()
                    .enumerate()
                    .filter(|&(_, &mask)| mask != 0 && query_mask & !mask == 0)
                    .map(|(i, _)| i.to_string())
                    .collect();

                let ids: Vec<String> = engine_with(pool.clone())
                    .search(&query)
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|r| r.id)
                    .collect();
                assert_eq!(ids, expected, "round {} query {:?}", round, query);
            }
        }
    }

    #[tokio::test]
    async fn test_results_are_capped() {
        let many = (0..10)
            .map(|i| recipe(&i.to_string(), 1.0 - i as f32 / 100.0, "양파", &["양파 1개"]))
            .collect();
        let mut engine = engine_with(many);
        engine.config.max_results = 3;

        let results = engine.search("양파").await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].id, "2");
    }

    #[tokio::test]
    async fn test_gateway_failure_is_search_error() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_query()
            .returning(|_| Err(VectorError::Embedding("model crashed".into())));
        let index = MockVectorIndex::<RecipeMetadata>::new();

        let engine =
            SearchFilterEngine::new(Arc::new(embedder), Arc::new(index), SearchConfig::default());
        let err = engine.search("양파").await.unwrap_err();
        assert!(matches!(err, RecipeError::Search(VectorError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_release_unloads_both_resources() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_unload().times(1).returning(|| true);
        let mut index = MockVectorIndex::<RecipeMetadata>::new();
        index.expect_unload().times(1).returning(|| false);

        let engine =
            SearchFilterEngine::new(Arc::new(embedder), Arc::new(index), SearchConfig::default());
        engine.release().await;
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [("DEFAULT_TOP_K", Some("50")), ("SEARCH_MAX_RESULTS", None::<&str>)],
            || {
                let config = SearchConfig::from_env().unwrap();
                assert_eq!(config.top_k, 50);
                assert_eq!(config.max_results, DEFAULT_MAX_RESULTS);
            },
        );

        temp_env::with_var("DEFAULT_TOP_K", Some("0"), || {
            assert!(SearchConfig::from_env().is_err());
        });
    }
}
