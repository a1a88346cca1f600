//! Similarity queries and idempotent upserts over a managed index connection.
//!
//! Each public call leases the connection on entry; the lease is dropped on
//! every exit path, so the connection is closed whenever no call is running.

mod repository;

pub use repository::{IndexPoint, ScoredPoint, VectorRepository};

#[cfg(any(test, feature = "mock"))]
pub use repository::MockVectorRepository;

use async_trait::async_trait;
use resource_lifecycle::ManagedResource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use tracing::debug;

use crate::error::{VectorError, VectorResult};

/// A decoded similarity hit
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch<M> {
    pub id: String,
    pub score: f32,
    pub metadata: M,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Index seam used by search and indexing, typed by its metadata record
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VectorIndex<M: Send + Sync + 'static>: Send + Sync {
    /// Up to `top_k` nearest neighbours, in the order the index returned them
    async fn query(&self, vector: Vec<f32>, top_k: u64) -> VectorResult<Vec<IndexMatch<M>>>;

    /// Store `metadata` under `id`, replacing any existing record
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: &M) -> VectorResult<UpsertOutcome>;

    /// Close the connection if no call is using it
    async fn unload(&self) -> bool;
}

/// [`VectorIndex`] over a managed [`VectorRepository`]
pub struct IndexGateway<R, M> {
    connection: ManagedResource<R>,
    dimension: usize,
    _metadata: PhantomData<fn() -> M>,
}

impl<R, M> IndexGateway<R, M>
where
    R: VectorRepository + 'static,
{
    pub fn new(connection: ManagedResource<R>, dimension: usize) -> Self {
        Self {
            connection,
            dimension,
            _metadata: PhantomData,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_loaded()
    }

    fn check_dimension(&self, vector: &[f32]) -> VectorResult<()> {
        if vector.len() != self.dimension {
            return Err(VectorError::Validation(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

fn decode_match<M: DeserializeOwned>(point: ScoredPoint) -> VectorResult<IndexMatch<M>> {
    let metadata = serde_json::from_value(Value::Object(point.payload)).map_err(|e| {
        VectorError::IndexQuery(format!("invalid metadata for record '{}': {}", point.id, e))
    })?;
    Ok(IndexMatch {
        id: point.id,
        score: point.score,
        metadata,
    })
}

fn encode_metadata<M: Serialize>(metadata: &M) -> VectorResult<Map<String, Value>> {
    match serde_json::to_value(metadata) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VectorError::Validation(
            "metadata must serialize to a JSON object".to_string(),
        )),
        Err(e) => Err(VectorError::Validation(e.to_string())),
    }
}

#[async_trait]
impl<R, M> VectorIndex<M> for IndexGateway<R, M>
where
    R: VectorRepository + 'static,
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn query(&self, vector: Vec<f32>, top_k: u64) -> VectorResult<Vec<IndexMatch<M>>> {
        self.check_dimension(&vector)?;
        let connection = self.connection.acquire().await?;

        let points = connection.search(vector, top_k).await?;
        debug!(top_k, matches = points.len(), "Index query returned");

        points.into_iter().map(decode_match).collect()
    }

    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: &M) -> VectorResult<UpsertOutcome> {
        self.check_dimension(&vector)?;
        let payload = encode_metadata(metadata)?;
        let connection = self.connection.acquire().await?;

        let outcome = if connection.exists(id).await? {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        connection
            .upsert(IndexPoint {
                id: id.to_string(),
                vector,
                payload,
            })
            .await?;

        debug!(id, ?outcome, "Upserted record");
        Ok(outcome)
    }

    async fn unload(&self) -> bool {
        self.connection.unload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_lifecycle::{LifecycleEvent, RecordingObserver, ResourceError, fn_factory};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        title: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn point(id: &str, score: f32, payload: Value) -> ScoredPoint {
        let Value::Object(payload) = payload else {
            panic!("payload must be an object");
        };
        ScoredPoint {
            id: id.to_string(),
            score,
            payload,
        }
    }

    fn gateway_with<F>(
        configure: F,
    ) -> (IndexGateway<MockVectorRepository, Doc>, Arc<RecordingObserver>)
    where
        F: Fn(&mut MockVectorRepository) + Send + Sync + 'static,
    {
        let observer = Arc::new(RecordingObserver::new());
        let connection = ManagedResource::with_observer(
            fn_factory("vector-index", move || {
                let mut repo = MockVectorRepository::new();
                configure(&mut repo);
                async move { Ok::<_, ResourceError>(repo) }
            }),
            observer.clone(),
        );
        (IndexGateway::new(connection, 3), observer)
    }

    #[tokio::test]
    async fn test_query_decodes_in_index_order() {
        let (gateway, observer) = gateway_with(|repo| {
            repo.expect_search().returning(|_, _| {
                Ok(vec![
                    point("b", 0.5, json!({"title": "두부조림"})),
                    point("a", 0.9, json!({"title": "제육볶음", "tags": ["매운"]})),
                ])
            });
        });

        let matches = gateway.query(vec![0.1, 0.2, 0.3], 10).await.unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "b");
        assert_eq!(matches[1].metadata.tags, vec!["매운".to_string()]);
        assert!(!gateway.is_connected());
        assert_eq!(observer.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_metadata_fails_fast() {
        let (gateway, _) = gateway_with(|repo| {
            repo.expect_search()
                .returning(|_, _| Ok(vec![point("x", 0.1, json!({"tags": []}))]));
        });

        let err = gateway.query(vec![0.0; 3], 1).await.unwrap_err();
        assert!(matches!(err, VectorError::IndexQuery(msg) if msg.contains("'x'")));
    }

    #[tokio::test]
    async fn test_transport_fault_releases_connection() {
        let (gateway, observer) = gateway_with(|repo| {
            repo.expect_search()
                .returning(|_, _| Err(VectorError::IndexQuery("connection reset".into())));
        });

        assert!(gateway.query(vec![0.0; 3], 5).await.is_err());
        assert_eq!(observer.count(LifecycleEvent::Released), 1);
        assert_eq!(observer.count(LifecycleEvent::Unloaded), 1);
        assert_eq!(observer.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_never_connects() {
        let (gateway, observer) = gateway_with(|_| {});

        let err = gateway.query(vec![0.0; 2], 5).await.unwrap_err();
        assert!(matches!(err, VectorError::Validation(_)));
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_reports_insert_then_update() {
        let doc = Doc {
            title: "된장찌개".into(),
            tags: vec![],
        };

        let (gateway, _) = gateway_with(|repo| {
            repo.expect_exists().returning(|_| Ok(false));
            repo.expect_upsert()
                .withf(|p| p.id == "r1" && p.payload["title"] == "된장찌개")
                .times(1)
                .returning(|_| Ok(()));
        });
        assert_eq!(
            gateway.upsert("r1", vec![0.0; 3], &doc).await.unwrap(),
            UpsertOutcome::Inserted
        );

        let (gateway, _) = gateway_with(|repo| {
            repo.expect_exists().returning(|_| Ok(true));
            repo.expect_upsert().times(1).returning(|_| Ok(()));
        });
        assert_eq!(
            gateway.upsert("r1", vec![0.0; 3], &doc).await.unwrap(),
            UpsertOutcome::Updated
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_resource_init() {
        let gateway: IndexGateway<MockVectorRepository, Doc> = IndexGateway::new(
            ManagedResource::new(fn_factory("vector-index", || async {
                Err(ResourceError::init("vector-index", "connection refused"))
            })),
            3,
        );

        let err = gateway.query(vec![0.0; 3], 1).await.unwrap_err();
        assert!(err.is_resource_init());
    }
}
