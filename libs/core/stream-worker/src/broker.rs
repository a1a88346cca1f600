//! Broker contract
//!
//! The worker talks to its queue only through [`MessageBroker`] (consume
//! side) and [`MessagePublisher`] (produce side). `RedisBroker` and
//! `StreamProducer` are the production implementations; `InMemoryBroker` and
//! `InMemoryPublisher` back tests and local runs.

use crate::error::StreamError;
use crate::event::Delivery;
use async_trait::async_trait;
use strum::{AsRefStr, Display};

/// Where a rejected delivery ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RejectOutcome {
    /// Put back on the job queue for another attempt
    Requeued,
    /// Moved to the dead-letter stream
    DeadLettered,
}

/// Dead-letter routing rule shared by every broker implementation.
///
/// A rejection is requeued only when the caller asked for it and the message
/// still has deliveries left; everything else is dead-lettered.
pub fn reject_outcome(delivery: &Delivery, requeue: bool, max_deliveries: u32) -> RejectOutcome {
    if requeue && delivery.delivery_count < max_deliveries {
        RejectOutcome::Requeued
    } else {
        RejectOutcome::DeadLettered
    }
}

/// Dead-letter reason for deliveries recovered after their last allowed attempt
pub const EXHAUSTED_REASON: &str = "max deliveries exceeded";

/// Whether a delivery has already used every allowed attempt.
///
/// Only a delivery recovered from a consumer that never settled it can get
/// here; it is dead-lettered before it reaches the processor.
pub fn deliveries_exhausted(delivery: &Delivery, max_deliveries: u32) -> bool {
    delivery.delivery_count > max_deliveries
}

/// Consume side of a queue with prefetch of one.
///
/// Implementations hand out at most one unacknowledged delivery per consumer:
/// the caller must `ack` or `reject` it before asking for the next.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare the queue and consumer group. Idempotent.
    async fn setup(&self) -> Result<(), StreamError>;

    /// Wait (bounded by the block timeout) for the next delivery.
    ///
    /// `Ok(None)` means nothing arrived in time.
    async fn next_delivery(&self) -> Result<Option<Delivery>, StreamError>;

    /// Acknowledge successful handling.
    async fn ack(&self, delivery: &Delivery) -> Result<(), StreamError>;

    /// Reject a delivery. The broker's dead-letter policy picks the outcome.
    async fn reject(
        &self,
        delivery: &Delivery,
        requeue: bool,
        reason: &str,
    ) -> Result<RejectOutcome, StreamError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StreamError>;

    /// Release broker-side resources held by this consumer.
    async fn close(&self) -> Result<(), StreamError>;
}

/// Produce side: durable publication of an already-encoded JSON body.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Destination stream name
    fn destination(&self) -> &str;

    /// Publish `body`; returns the broker-assigned message ID.
    async fn publish(&self, body: &str) -> Result<String, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_outcome_single_delivery_goes_to_dlq() {
        let delivery = Delivery::new("1-0", "[]");
        assert_eq!(reject_outcome(&delivery, true, 1), RejectOutcome::DeadLettered);
    }

    #[test]
    fn test_reject_outcome_requeues_until_limit() {
        let mut delivery = Delivery::new("1-0", "[]");
        assert_eq!(reject_outcome(&delivery, true, 3), RejectOutcome::Requeued);

        delivery.delivery_count = 3;
        assert_eq!(reject_outcome(&delivery, true, 3), RejectOutcome::DeadLettered);
    }

    #[test]
    fn test_reject_outcome_without_requeue() {
        let delivery = Delivery::new("1-0", "[]");
        assert_eq!(reject_outcome(&delivery, false, 10), RejectOutcome::DeadLettered);
    }

    #[test]
    fn test_reclaimed_delivery_counts_crashed_attempts() {
        let fields = vec![("body".to_string(), "[]".to_string())];
        let reclaimed = Delivery::from_fields("1700000000000-0", &fields)
            .unwrap()
            .with_unsettled_deliveries(5);

        assert_eq!(reclaimed.delivery_count, 6);
        assert!(deliveries_exhausted(&reclaimed, 3));
        assert_eq!(reject_outcome(&reclaimed, true, 3), RejectOutcome::DeadLettered);
    }

    #[test]
    fn test_first_reclaim_still_within_limit() {
        let reclaimed = Delivery::new("1700000000000-0", "[]").with_unsettled_deliveries(1);

        assert_eq!(reclaimed.delivery_count, 2);
        assert!(!deliveries_exhausted(&reclaimed, 3));
        assert!(deliveries_exhausted(&reclaimed, 1));
    }

    #[test]
    fn test_fresh_delivery_never_exhausted() {
        assert!(!deliveries_exhausted(&Delivery::new("1-0", "[]"), 1));
    }

    #[test]
    fn test_reject_outcome_display() {
        assert_eq!(RejectOutcome::DeadLettered.to_string(), "dead_lettered");
    }
}
