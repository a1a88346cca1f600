use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, CreateCollectionBuilder, Distance, GetPointsBuilder, PointId, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use resource_lifecycle::{ResourceError, ResourceFactory};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::QdrantConfig;
use super::payload::{from_qdrant, to_qdrant};
use crate::error::{VectorError, VectorResult};
use crate::index::{IndexPoint, ScoredPoint, VectorRepository};

pub const INDEX_RESOURCE: &str = "vector-index";

/// Payload key holding the caller's record id; point ids are derived UUIDs
const RECORD_ID_KEY: &str = "record_id";

/// Qdrant-backed implementation of VectorRepository, bound to one collection
pub struct QdrantRepository {
    client: Qdrant,
    collection: String,
}

impl QdrantRepository {
    pub fn new(config: &QdrantConfig) -> VectorResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| VectorError::IndexQuery(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection (cosine distance) if it does not exist yet.
    ///
    /// Returns `true` when it had to be created.
    pub async fn ensure_collection(&self, dimension: usize) -> VectorResult<bool> {
        if self.client.collection_exists(&self.collection).await? {
            return Ok(false);
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await?;

        info!(collection = %self.collection, dimension, "Created collection");
        Ok(true)
    }

    pub(crate) fn point_id(record_id: &str) -> PointId {
        PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string())
    }

    fn point_id_string(point_id: Option<&PointId>) -> String {
        match point_id.and_then(|p| p.point_id_options.as_ref()) {
            Some(qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid.clone(),
            Some(qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl VectorRepository for QdrantRepository {
    async fn search(&self, vector: Vec<f32>, limit: u64) -> VectorResult<Vec<ScoredPoint>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, limit).with_payload(true),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let mut payload = from_qdrant(point.payload);
                let id = match payload.remove(RECORD_ID_KEY) {
                    Some(Value::String(id)) => id,
                    _ => Self::point_id_string(point.id.as_ref()),
                };
                ScoredPoint {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }

    async fn exists(&self, id: &str) -> VectorResult<bool> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![Self::point_id(id)])
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await?;

        Ok(!response.result.is_empty())
    }

    async fn upsert(&self, point: IndexPoint) -> VectorResult<()> {
        let mut payload = point.payload;
        payload.insert(RECORD_ID_KEY.to_string(), Value::String(point.id.clone()));

        let point_struct = PointStruct::new(Self::point_id(&point.id), point.vector, to_qdrant(payload));

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point_struct]).wait(true))
            .await?;

        debug!(collection = %self.collection, id = %point.id, "Point upserted");
        Ok(())
    }
}

/// Opens a client and makes sure the collection exists
pub struct QdrantConnector {
    config: QdrantConfig,
}

impl QdrantConnector {
    pub fn new(config: QdrantConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResourceFactory<QdrantRepository> for QdrantConnector {
    fn name(&self) -> &str {
        INDEX_RESOURCE
    }

    async fn create(&self) -> Result<QdrantRepository, ResourceError> {
        let repository =
            QdrantRepository::new(&self.config).map_err(|e| ResourceError::init(INDEX_RESOURCE, e))?;
        repository
            .ensure_collection(self.config.dimension)
            .await
            .map_err(|e| ResourceError::init(INDEX_RESOURCE, e))?;

        debug!(url = %self.config.url, collection = %self.config.collection, "Index connection opened");
        Ok(repository)
    }
}
