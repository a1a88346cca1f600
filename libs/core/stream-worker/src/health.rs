//! Health and admin handlers for stream workers.
//!
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`)
//! - Stream monitoring (`/stream/info`)
//! - Prometheus metrics (`/metrics`)
//! - DLQ endpoints (`/dlq/stats`, `/dlq/messages`, `DELETE /dlq`)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;

use crate::broker::MessageBroker;
use crate::consumer::RedisBroker;
use crate::error::StreamError;
use crate::metrics;
use crate::worker::{SlotState, StreamProcessor};

const MAX_DLQ_PAGE: usize = 100;

type HandlerError = (StatusCode, Json<Value>);

/// Processor-side readiness, erased over the job type
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn ready(&self) -> Result<bool, StreamError>;
}

/// Adapts a [`StreamProcessor`] into a [`ReadinessProbe`]
pub struct ProcessorProbe<J, P> {
    processor: Arc<P>,
    _job: PhantomData<fn() -> J>,
}

impl<J, P> ProcessorProbe<J, P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self {
            processor,
            _job: PhantomData,
        }
    }
}

#[async_trait]
impl<J, P> ReadinessProbe for ProcessorProbe<J, P>
where
    J: Send + Sync + 'static,
    P: StreamProcessor<J> + 'static,
{
    async fn ready(&self) -> Result<bool, StreamError> {
        self.processor.health_check().await
    }
}

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub broker: Arc<RedisBroker>,
    pub app_name: String,
    pub app_version: String,
    slot: Option<watch::Receiver<SlotState>>,
    probe: Option<Arc<dyn ReadinessProbe>>,
}

impl HealthState {
    pub fn new(
        broker: Arc<RedisBroker>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            app_name: app_name.into(),
            app_version: app_version.into(),
            slot: None,
            probe: None,
        }
    }

    /// Report the worker's slot state on `/stream/info`
    pub fn with_slot_state(mut self, slot: watch::Receiver<SlotState>) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Include the processor in `/ready`
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    fn slot_state(&self) -> Option<SlotState> {
        self.slot.as_ref().map(|rx| *rx.borrow())
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// Liveness probe. Always OK while the process serves requests.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe: the broker answers PING and the processor is healthy.
pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let broker = match state.broker.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let processor = match &state.probe {
        None => "ok".to_string(),
        Some(probe) => match probe.ready().await {
            Ok(true) => "ok".to_string(),
            Ok(false) => "unhealthy".to_string(),
            Err(e) => format!("error: {}", e),
        },
    };

    readiness_response(&broker, &processor)
}

fn readiness_response(broker: &str, processor: &str) -> (StatusCode, Json<Value>) {
    let ready = broker == "ok" && processor == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "broker": broker,
                "processor": processor,
            }
        })),
    )
}

/// Queue depth, pending count and the current slot state
pub async fn stream_info_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, HandlerError> {
    let info = state.broker.stream_info().await.map_err(internal_error)?;
    Ok(Json(json!({
        "stream": info.stream_name,
        "consumer_group": info.consumer_group,
        "consumer_id": info.consumer_id,
        "length": info.length,
        "pending": info.pending_count,
        "slot_state": state.slot_state(),
    })))
}

/// Prometheus text format
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct DlqListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    10
}

/// `GET /dlq/stats`
pub async fn dlq_stats_handler(
    State(state): State<HealthState>,
) -> Result<impl IntoResponse, HandlerError> {
    let stats = state.broker.dlq().stats().await.map_err(internal_error)?;
    Ok(Json(stats))
}

/// `GET /dlq/messages?limit=10&offset=0`
pub async fn dlq_list_handler(
    State(state): State<HealthState>,
    Query(params): Query<DlqListParams>,
) -> Result<impl IntoResponse, HandlerError> {
    let limit = params.limit.min(MAX_DLQ_PAGE);
    let messages = state
        .broker
        .dlq()
        .list(limit, params.offset)
        .await
        .map_err(internal_error)?;

    Ok(Json(json!({
        "count": messages.len(),
        "limit": limit,
        "offset": params.offset,
        "messages": messages,
    })))
}

/// `DELETE /dlq`: permanently removes every dead-lettered entry
pub async fn dlq_purge_handler(
    State(state): State<HealthState>,
) -> Result<impl IntoResponse, HandlerError> {
    let count = state.broker.dlq().purge().await.map_err(internal_error)?;
    Ok(Json(json!({ "purged": count })))
}

fn internal_error(e: StreamError) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Liveness, readiness, stream info and metrics
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// [`health_router`] plus the DLQ endpoints
pub fn admin_router(state: HealthState) -> Router {
    Router::new()
        .route("/dlq/stats", get(dlq_stats_handler))
        .route("/dlq/messages", get(dlq_list_handler))
        .route("/dlq", axum::routing::delete(dlq_purge_handler))
        .with_state(state.clone())
        .merge(health_router(state))
}
