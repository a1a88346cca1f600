//! Stream Worker Framework
//!
//! A single-slot Redis Streams worker for processing background jobs.
//!
//! ## Features
//!
//! - **Generic worker**: `StreamWorker<J, P>` decodes and processes any JSON job type
//! - **Prefetch of one**: each delivery is acked or rejected before the next is read
//! - **Consumer groups**: horizontal scaling and reclaiming of abandoned entries
//! - **Dead Letter Queue**: rejected and expired jobs with their failure reason
//! - **Prometheus metrics**: built-in observability
//! - **Health endpoints**: K8s-ready liveness and readiness probes
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{QueueConfig, RedisBroker, StreamDef, StreamWorker, connect_with_retry};
//!
//! struct MyStream;
//! impl StreamDef for MyStream {
//!     const STREAM_NAME: &'static str = "my.queue";
//!     const CONSUMER_GROUP: &'static str = "my_workers";
//!     const DLQ_STREAM: &'static str = "my.queue.dlq";
//! }
//!
//! let queue = QueueConfig::from_env_for::<MyStream>()?;
//! let redis = connect_with_retry(&queue.url, 5).await?;
//! let broker = Arc::new(RedisBroker::new(redis, queue.worker_config(MyStream::CONSUMER_GROUP)));
//! let worker = StreamWorker::<MyJob, _>::new(broker, processor, MyStream::STREAM_NAME);
//! worker.run(shutdown_rx).await?;
//! ```

mod broker;
mod config;
mod connection;
mod consumer;
mod dlq;
mod error;
mod event;
mod health;
mod memory;
pub mod metrics;
mod producer;
mod registry;
mod worker;

pub use broker::{
    EXHAUSTED_REASON, MessageBroker, MessagePublisher, RejectOutcome, deliveries_exhausted,
    reject_outcome,
};
pub use config::{QueueConfig, WorkerConfig};
pub use connection::{connect, connect_with_retry};
pub use consumer::{RedisBroker, StreamInfo};
pub use dlq::{DlqEntry, DlqManager, DlqRecord, DlqStats};
pub use error::{ErrorCategory, StreamError};
pub use event::Delivery;
pub use health::{
    HealthResponse, HealthState, ProcessorProbe, ReadinessProbe, admin_router, health_router,
};
pub use memory::{InMemoryBroker, InMemoryPublisher};
pub use metrics::{StreamMetrics, init_metrics};
pub use producer::StreamProducer;
pub use registry::{MessageField, StreamDef};
pub use worker::{SlotState, StreamProcessor, StreamWorker};
