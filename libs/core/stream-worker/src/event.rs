//! Delivery envelope
//!
//! Wraps a raw message body with its stream metadata (id, first-enqueue
//! time, delivery count). Decoding into a job type is the worker's job.

use crate::registry::MessageField;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One message handed to a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Stream entry ID of this delivery (e.g., "1234567890123-0")
    pub stream_id: String,

    /// Stream entry ID of the first delivery; equals `stream_id` unless requeued
    pub original_id: String,

    /// Raw payload
    pub body: String,

    /// When the message was first enqueued
    pub enqueued_at: DateTime<Utc>,

    /// Number of times this message has been delivered, starting at 1
    pub delivery_count: u32,
}

impl Delivery {
    pub fn new(stream_id: impl Into<String>, body: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        Self {
            enqueued_at: parse_stream_timestamp(&stream_id),
            original_id: stream_id.clone(),
            stream_id,
            body: body.into(),
            delivery_count: 1,
        }
    }

    /// Build from the field list of a stream entry.
    ///
    /// Returns `None` when the entry has no body.
    pub fn from_fields(stream_id: impl Into<String>, fields: &[(String, String)]) -> Option<Self> {
        let stream_id = stream_id.into();
        let map: HashMap<&str, &str> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let body = map.get(MessageField::Body.as_ref())?;
        let mut delivery = Self::new(stream_id, *body);

        if let Some(original) = map.get(MessageField::OriginalId.as_ref()) {
            delivery.original_id = original.to_string();
        }
        if let Some(enqueued_at) = map
            .get(MessageField::EnqueuedAt.as_ref())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        {
            delivery.enqueued_at = enqueued_at.with_timezone(&Utc);
        }
        if let Some(count) = map
            .get(MessageField::DeliveryCount.as_ref())
            .and_then(|raw| raw.parse::<u32>().ok())
        {
            delivery.delivery_count = count.max(1);
        }

        Some(delivery)
    }

    /// Count deliveries of this entry that were never acked or rejected.
    ///
    /// `unsettled` is the entry's delivery counter from the pending list,
    /// read before the entry is handed out again.
    pub fn with_unsettled_deliveries(mut self, unsettled: u32) -> Self {
        self.delivery_count = self.delivery_count.saturating_add(unsettled);
        self
    }

    /// Stable identifier across requeues
    pub fn message_id(&self) -> &str {
        &self.original_id
    }

    /// Check if this is a redelivery
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.enqueued_at
    }

    pub fn age_ms(&self) -> i64 {
        self.age().num_milliseconds()
    }

    /// Whether the message outlived `ttl_ms` before being processed
    pub fn is_expired(&self, ttl_ms: Option<u64>) -> bool {
        match ttl_ms {
            Some(ttl) => self.age_ms() > ttl as i64,
            None => false,
        }
    }
}

/// Parse the millisecond timestamp prefix of a stream ID ("ms-seq")
pub(crate) fn parse_stream_timestamp(stream_id: &str) -> DateTime<Utc> {
    stream_id
        .split('-')
        .next()
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
