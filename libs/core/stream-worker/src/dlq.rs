//! Dead-letter stream management
//!
//! Rejected and expired deliveries land here with the reason they failed.
//! The admin endpoints read from it; nothing consumes it automatically.

use crate::error::StreamError;
use crate::event::Delivery;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

type StreamEntries = Vec<(String, Vec<(String, String)>)>;

const ENTRY_FIELD: &str = "entry";

/// Dead-letter stream manager
#[derive(Clone)]
pub struct DlqManager {
    redis: Arc<ConnectionManager>,
    source_stream: String,
    dlq_stream: String,
    max_length: i64,
}

impl DlqManager {
    pub fn new(
        redis: Arc<ConnectionManager>,
        source_stream: impl Into<String>,
        dlq_stream: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            source_stream: source_stream.into(),
            dlq_stream: dlq_stream.into(),
            max_length: 10_000,
        }
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn dlq_stream(&self) -> &str {
        &self.dlq_stream
    }

    /// Append a failed delivery to the dead-letter stream
    pub async fn move_to_dlq(&self, delivery: &Delivery, reason: &str) -> Result<String, StreamError> {
        let entry = DlqEntry::from_delivery(delivery, &self.source_stream, reason);
        let data = serde_json::to_string(&entry)?;
        let mut conn = (*self.redis).clone();

        let dlq_id: String = redis::cmd("XADD")
            .arg(&self.dlq_stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(ENTRY_FIELD)
            .arg(&data)
            .query_async(&mut conn)
            .await?;

        info!(
            message_id = %delivery.message_id(),
            dlq_id = %dlq_id,
            reason = %reason,
            delivery_count = delivery.delivery_count,
            "Moved message to DLQ"
        );

        Ok(dlq_id)
    }

    pub async fn stats(&self) -> Result<DlqStats, StreamError> {
        let mut conn = (*self.redis).clone();

        let length: i64 = conn.xlen(&self.dlq_stream).await?;

        let oldest: StreamEntries = redis::cmd("XRANGE")
            .arg(&self.dlq_stream)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let newest: StreamEntries = redis::cmd("XREVRANGE")
            .arg(&self.dlq_stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        Ok(DlqStats {
            stream_name: self.dlq_stream.clone(),
            length,
            oldest_entry_id: oldest.first().map(|(id, _)| id.clone()),
            newest_entry_id: newest.first().map(|(id, _)| id.clone()),
        })
    }

    /// List entries oldest first, skipping `offset`
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DlqRecord>, StreamError> {
        let mut conn = (*self.redis).clone();

        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(&self.dlq_stream)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(offset + limit)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .into_iter()
            .skip(offset)
            .filter_map(|(id, fields)| {
                fields
                    .iter()
                    .find(|(k, _)| k == ENTRY_FIELD)
                    .and_then(|(_, data)| serde_json::from_str::<DlqEntry>(data).ok())
                    .map(|entry| DlqRecord { dlq_id: id, entry })
            })
            .collect())
    }

    /// Delete every entry; returns how many were removed
    pub async fn purge(&self) -> Result<i64, StreamError> {
        let mut conn = (*self.redis).clone();

        let len: i64 = conn.xlen(&self.dlq_stream).await?;
        if len > 0 {
            let _: i64 = redis::cmd("XTRIM")
                .arg(&self.dlq_stream)
                .arg("MAXLEN")
                .arg(0)
                .query_async(&mut conn)
                .await?;
            info!(count = len, stream = %self.dlq_stream, "Purged DLQ");
        } else {
            debug!(stream = %self.dlq_stream, "DLQ already empty");
        }

        Ok(len)
    }
}

/// What gets stored for each dead-lettered message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Stream ID of the first delivery
    pub message_id: String,

    /// Stream the message was consumed from
    pub source_stream: String,

    /// Original body, verbatim
    pub body: String,

    /// Why it was dead-lettered (error text or `expired`)
    pub reason: String,

    pub delivery_count: u32,

    pub enqueued_at: DateTime<Utc>,

    pub failed_at: DateTime<Utc>,
}

impl DlqEntry {
    pub fn from_delivery(delivery: &Delivery, source_stream: &str, reason: &str) -> Self {
        Self {
            message_id: delivery.message_id().to_string(),
            source_stream: source_stream.to_string(),
            body: delivery.body.clone(),
            reason: reason.to_string(),
            delivery_count: delivery.delivery_count,
            enqueued_at: delivery.enqueued_at,
            failed_at: Utc::now(),
        }
    }
}

/// A DLQ entry with its own stream ID
#[derive(Debug, Clone, Serialize)]
pub struct DlqRecord {
    pub dlq_id: String,
    #[serde(flatten)]
    pub entry: DlqEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStats {
    pub stream_name: String,
    pub length: i64,
    pub oldest_entry_id: Option<String>,
    pub newest_entry_id: Option<String>,
}
