//! Stream producer
//!
//! Publishes JSON bodies to a stream with the delivery headers consumers
//! expect (`content_type`, `content_encoding`, `delivery_mode`).
//!
//! # Example
//!
//! ```rust,ignore
//! use stream_worker::{MessagePublisher, StreamProducer};
//!
//! let producer = StreamProducer::new(redis, "response.queue");
//! let id = producer.publish(&serde_json::to_string(&result)?).await?;
//! ```

use crate::broker::MessagePublisher;
use crate::error::StreamError;
use crate::registry::MessageField;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::debug;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";
pub const DELIVERY_MODE_PERSISTENT: &str = "persistent";

/// Publishes messages to one stream.
#[derive(Clone)]
pub struct StreamProducer {
    redis: Arc<ConnectionManager>,
    stream_name: String,
    max_length: i64,
}

impl StreamProducer {
    pub fn new(redis: Arc<ConnectionManager>, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    /// Set the maximum stream length (MAXLEN ~)
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }
}

#[async_trait]
impl MessagePublisher for StreamProducer {
    fn destination(&self) -> &str {
        &self.stream_name
    }

    async fn publish(&self, body: &str) -> Result<String, StreamError> {
        let mut conn = (*self.redis).clone();

        let stream_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(MessageField::Body.as_ref())
            .arg(body)
            .arg(MessageField::ContentType.as_ref())
            .arg(CONTENT_TYPE_JSON)
            .arg(MessageField::ContentEncoding.as_ref())
            .arg(CONTENT_ENCODING_UTF8)
            .arg(MessageField::DeliveryMode.as_ref())
            .arg(DELIVERY_MODE_PERSISTENT)
            .arg(MessageField::EnqueuedAt.as_ref())
            .arg(Utc::now().to_rfc3339())
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            bytes = body.len(),
            "Published message"
        );

        Ok(stream_id)
    }
}
