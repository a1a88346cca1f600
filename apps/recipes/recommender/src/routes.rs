//! `/recipes` HTTP endpoints

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use domain_recipes::{
    IngredientQuery, RecipeError, RecommendationJob, RecommendationProcessor, SearchFilterEngine,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct RecipesState {
    pub engine: Arc<SearchFilterEngine>,
    pub processor: Arc<RecommendationProcessor>,
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub query: String,
}

pub struct ApiError(RecipeError);

impl From<RecipeError> for ApiError {
    fn from(e: RecipeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecipeError::Search(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecipeError::Generation(_) => StatusCode::BAD_GATEWAY,
            RecipeError::Publish(_) | RecipeError::Load(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "Request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn search_handler(
    State(state): State<RecipesState>,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let results = state.engine.search(&params.query).await?;
    Ok(Json(results).into_response())
}

async fn recommend_handler(
    State(state): State<RecipesState>,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let query = IngredientQuery::parse(&params.query);
    let job = RecommendationJob::from_names(query.ingredients().iter().cloned());

    match state.processor.recommend(&job).await? {
        Some(result) => Ok(Json(result).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no recipes match the given ingredients" })),
        )
            .into_response()),
    }
}

pub fn recipes_router(state: RecipesState) -> Router {
    Router::new()
        .route("/recipes/search", get(search_handler))
        .route("/recipes/recommend", get(recommend_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use domain_recipes::{
        Ingredient, Recipe, RecipeGenerator, RecipeMetadata, RecipeResult, RecipeSummary,
        RecommendationResult, SearchConfig,
    };
    use domain_vector::{IndexMatch, MockEmbedder, MockVectorIndex, VectorError};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use stream_worker::InMemoryPublisher;
    use tower::ServiceExt;

    struct FixedGenerator(Option<RecommendationResult>);

    #[async_trait]
    impl RecipeGenerator for FixedGenerator {
        async fn generate(
            &self,
            _job: &RecommendationJob,
            _candidates: &[RecipeSummary],
        ) -> RecipeResult<Option<RecommendationResult>> {
            Ok(self.0.clone())
        }
    }

    fn jeyuk() -> IndexMatch<RecipeMetadata> {
        IndexMatch {
            id: "1".into(),
            score: 0.9,
            metadata: RecipeMetadata {
                title: "제육볶음".into(),
                ingredients: vec!["돼지고기".into(), "양파".into()],
                raw_ingredients: vec!["돼지고기 100g".into(), "양파 1개".into()],
                steps: vec!["볶는다".into()],
            },
        }
    }

    fn app(index: MockVectorIndex<RecipeMetadata>, generated: Option<RecommendationResult>) -> Router {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_query()
            .returning(|_| Ok(vec![0.0; 3]));

        let engine = Arc::new(SearchFilterEngine::new(
            Arc::new(embedder),
            Arc::new(index),
            SearchConfig::default(),
        ));
        let processor = Arc::new(RecommendationProcessor::new(
            engine.clone(),
            Arc::new(FixedGenerator(generated)),
            Arc::new(InMemoryPublisher::new("response.queue")),
        ));
        recipes_router(RecipesState { engine, processor })
    }

    fn index_returning(matches: Vec<IndexMatch<RecipeMetadata>>) -> MockVectorIndex<RecipeMetadata> {
        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .returning(move |_, _| Ok(matches.clone()));
        index
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_returns_formatted_candidates() {
        let app = app(index_returning(vec![jeyuk()]), None);

        let (status, body) = get(app, "/recipes/search?query=%EB%8F%BC%EC%A7%80%EA%B3%A0%EA%B8%B0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "제육볶음");
        assert_eq!(body[0]["ingredients"][0], "돼지고기 100g");
    }

    #[tokio::test]
    async fn test_recommend_without_candidates_is_404() {
        let app = app(index_returning(vec![jeyuk()]), None);

        let (status, _) = get(app, "/recipes/recommend?query=%EC%B9%98%EC%A6%88").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recommend_returns_generated_result() {
        let generated = RecommendationResult {
            recipes: vec![Recipe {
                recipe_id: "1".into(),
                name: "제육볶음".into(),
                ingredients: vec![Ingredient {
                    name: "돼지고기".into(),
                    amount: "100g".into(),
                }],
                steps: vec!["볶는다".into()],
            }],
        };
        let app = app(index_returning(vec![jeyuk()]), Some(generated));

        let (status, body) = get(app, "/recipes/recommend?query=%EC%96%91%ED%8C%8C").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["레시피 목록"][0]["레시피 이름"], "제육볶음");
    }

    #[tokio::test]
    async fn test_index_failure_is_503() {
        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .returning(|_, _| Err(VectorError::IndexQuery("timeout".into())));
        let app = app(index, None);

        let (status, body) = get(app, "/recipes/search?query=x").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("timeout"));
    }
}
