//! Stream registry types and definitions.
//!
//! - `StreamDef` trait for domain-specific queue definitions
//! - `MessageField` enum for the field names carried by every stream entry

use strum::{AsRefStr, Display, EnumString};

/// Field names used in stream entries.
///
/// Every entry carries `body`; the rest are delivery metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageField {
    /// The payload (JSON, UTF-8).
    Body,
    /// MIME type of the body.
    ContentType,
    /// Character encoding of the body.
    ContentEncoding,
    /// `persistent` or `transient`.
    DeliveryMode,
    /// How many times this message has been handed to a consumer.
    DeliveryCount,
    /// First enqueue time (RFC 3339), preserved across requeues.
    EnqueuedAt,
    /// Stream id of the first delivery, preserved across requeues.
    OriginalId,
}

/// Queue definition trait.
///
/// Each domain implements this trait to name its job queue, the consumer
/// group that works it, the dead-letter stream for rejected messages and the
/// reply stream results are published to.
///
/// # Example
///
/// ```rust,ignore
/// use stream_worker::StreamDef;
///
/// pub struct RecommendationStream;
///
/// impl StreamDef for RecommendationStream {
///     const STREAM_NAME: &'static str = "recommendation.queue";
///     const CONSUMER_GROUP: &'static str = "recommendation_workers";
///     const DLQ_STREAM: &'static str = "recommendation.queue.dlq";
///     const REPLY_STREAM: &'static str = "response.queue";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The job stream name.
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// Dead-letter stream for rejected or expired messages.
    const DLQ_STREAM: &'static str;

    /// Stream that results are published to. Empty when the stream has no replies.
    const REPLY_STREAM: &'static str = "";

    /// Maximum stream length before auto-trim (MAXLEN ~).
    const MAX_LENGTH: i64 = 100_000;

    /// How long a delivery may sit unacknowledged before another consumer claims it.
    const CLAIM_TIMEOUT_MS: u64 = 300_000;

    /// Blocking read timeout.
    const BLOCK_TIMEOUT_MS: u64 = 5_000;
}
