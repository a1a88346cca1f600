//! Stream definitions for the recommendation pipeline.

use stream_worker::StreamDef;

/// Recommendation jobs in, generated recipes out.
pub struct RecommendationStream;

impl StreamDef for RecommendationStream {
    const STREAM_NAME: &'static str = "recommendation.queue";

    const CONSUMER_GROUP: &'static str = "recommendation_workers";

    const DLQ_STREAM: &'static str = "recommendation.queue.dlq";

    const REPLY_STREAM: &'static str = "response.queue";

    /// Generation can take a while; don't let another consumer claim too early.
    const CLAIM_TIMEOUT_MS: u64 = 300_000;
}
