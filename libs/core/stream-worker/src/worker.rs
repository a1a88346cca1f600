//! Processor trait and the single-slot `StreamWorker`.
//!
//! Each worker owns one consumer slot:
//!
//! ```text
//! Idle -> Processing -> Acknowledged | RejectedRequeued | RejectedDeadLettered -> Idle
//! ```
//!
//! A delivery is settled (acked or rejected) before the next one is read.

use crate::broker::{MessageBroker, RejectOutcome};
use crate::error::StreamError;
use crate::event::Delivery;
use crate::metrics::StreamMetrics;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::{Display, IntoStaticStr};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_MS: u64 = 30_000;

/// Trait for job processors.
///
/// Domain handlers implement this to process decoded jobs. Returning `Err`
/// rejects the delivery; the error's category decides whether a requeue is
/// requested.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl StreamProcessor<RecommendationJob> for RecommendationProcessor {
///     async fn process(&self, job: &RecommendationJob) -> Result<(), StreamError> {
///         self.handle(job).await.map_err(Into::into)
///     }
///
///     fn name(&self) -> &'static str {
///         "RecommendationProcessor"
///     }
/// }
/// ```
#[async_trait]
pub trait StreamProcessor<J>: Send + Sync {
    /// Process a single job.
    async fn process(&self, job: &J) -> Result<(), StreamError>;

    /// Processor name for logging.
    fn name(&self) -> &'static str;

    /// Health check for readiness probes.
    async fn health_check(&self) -> Result<bool, StreamError> {
        Ok(true)
    }

    /// Release anything the processor still holds. Called once after the
    /// last delivery is settled.
    async fn shutdown(&self) {}
}

/// State of a consumer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    Processing,
    Acknowledged,
    RejectedRequeued,
    RejectedDeadLettered,
}

impl From<RejectOutcome> for SlotState {
    fn from(outcome: RejectOutcome) -> Self {
        match outcome {
            RejectOutcome::Requeued => SlotState::RejectedRequeued,
            RejectOutcome::DeadLettered => SlotState::RejectedDeadLettered,
        }
    }
}

/// Single-slot worker driving a processor from a broker.
///
/// # Type Parameters
///
/// * `J` - The job type decoded from each delivery body (JSON)
/// * `P` - The processor type
pub struct StreamWorker<J, P> {
    broker: Arc<dyn MessageBroker>,
    processor: Arc<P>,
    metrics: StreamMetrics,
    state: watch::Sender<SlotState>,
    _job: PhantomData<fn() -> J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: DeserializeOwned + Send + Sync + 'static,
    P: StreamProcessor<J> + 'static,
{
    pub fn new(broker: Arc<dyn MessageBroker>, processor: Arc<P>, stream_name: &str) -> Self {
        let (state, _) = watch::channel(SlotState::Idle);
        Self {
            broker,
            processor,
            metrics: StreamMetrics::new(stream_name),
            state,
            _job: PhantomData,
        }
    }

    /// Watch the slot state
    pub fn slot_state(&self) -> watch::Receiver<SlotState> {
        self.state.subscribe()
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Shutdown is observed between deliveries: a job in progress always runs
    /// to a settled state first. Afterwards the processor and broker are told
    /// to release what they hold.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        self.broker.setup().await?;
        info!(processor = %self.processor.name(), "Starting stream worker");

        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Only the wait for a delivery is cancellable; an entry read but
            // dropped here stays pending and is reclaimed later.
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = self.broker.next_delivery() => next,
            };

            let polled = match next {
                Ok(Some(delivery)) => self.handle_delivery(delivery).await.map(Some),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };

            match polled {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Broker recovered");
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff = backoff_delay(consecutive_errors);
                    error!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "Broker error, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!("Shutdown requested, releasing resources");
        self.processor.shutdown().await;
        if let Err(e) = self.broker.close().await {
            warn!(error = %e, "Failed to close broker");
        }
        info!("Stream worker stopped");
        Ok(())
    }

    /// Take at most one delivery and drive it to a settled state.
    ///
    /// Returns the terminal state, or `None` if nothing arrived. `Err` means
    /// the broker itself failed (read, ack or reject).
    pub async fn poll_once(&self) -> Result<Option<SlotState>, StreamError> {
        match self.broker.next_delivery().await? {
            Some(delivery) => self.handle_delivery(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<SlotState, StreamError> {
        let started = Instant::now();
        self.state.send_replace(SlotState::Processing);
        self.metrics.job_received();

        debug!(
            message_id = %delivery.message_id(),
            delivery_count = delivery.delivery_count,
            age_ms = delivery.age_ms(),
            "Processing message"
        );

        let result = match serde_json::from_str::<J>(&delivery.body) {
            Ok(job) => self.processor.process(&job).await,
            Err(e) => Err(StreamError::Serialization(format!(
                "failed to decode payload: {}",
                e
            ))),
        };

        let settled = match result {
            Ok(()) => self.broker.ack(&delivery).await.map(|_| SlotState::Acknowledged),
            Err(e) => {
                let category = e.category();
                self.metrics.job_error(category.as_str());
                warn!(
                    message_id = %delivery.message_id(),
                    error = %e,
                    category = category.as_str(),
                    "Processing failed, rejecting message"
                );
                self.broker
                    .reject(&delivery, e.should_requeue(), &e.to_string())
                    .await
                    .map(SlotState::from)
            }
        };

        let terminal = match settled {
            Ok(state) => state,
            Err(e) => {
                self.state.send_replace(SlotState::Idle);
                error!(
                    message_id = %delivery.message_id(),
                    error = %e,
                    "Failed to settle message; it stays pending until reclaimed"
                );
                return Err(e);
            }
        };

        self.state.send_replace(terminal);
        self.metrics.job_finished(terminal.into(), started.elapsed());
        info!(
            message_id = %delivery.message_id(),
            state = %terminal,
            duration_ms = started.elapsed().as_millis() as u64,
            "Message settled"
        );
        self.state.send_replace(SlotState::Idle);

        Ok(terminal)
    }
}

fn backoff_delay(consecutive_errors: u32) -> Duration {
    let ms = 100u64.saturating_mul(2u64.saturating_pow(consecutive_errors.min(10)));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockMessageBroker;
    use crate::memory::InMemoryBroker;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    struct EchoJob {
        value: String,
    }

    #[derive(Default)]
    struct EchoProcessor {
        seen: AtomicUsize,
        shut_down: AtomicBool,
    }

    #[async_trait]
    impl StreamProcessor<EchoJob> for EchoProcessor {
        async fn process(&self, job: &EchoJob) -> Result<(), StreamError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            match job.value.as_str() {
                "transient" => Err(StreamError::transient("downstream timeout")),
                "permanent" => Err(StreamError::permanent("invalid input")),
                _ => Ok(()),
            }
        }

        fn name(&self) -> &'static str {
            "EchoProcessor"
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn worker(broker: Arc<dyn MessageBroker>) -> StreamWorker<EchoJob, EchoProcessor> {
        StreamWorker::new(broker, Arc::new(EchoProcessor::default()), "test.queue")
    }

    #[tokio::test]
    async fn test_success_is_acknowledged() {
        let mut broker = MockMessageBroker::new();
        broker
            .expect_next_delivery()
            .times(1)
            .returning(|| Ok(Some(Delivery::new("1-0", r#"{"value":"ok"}"#))));
        broker.expect_ack().times(1).returning(|_| Ok(()));
        broker.expect_reject().never();

        let worker = worker(Arc::new(broker));
        let state = worker.poll_once().await.unwrap();

        assert_eq!(state, Some(SlotState::Acknowledged));
        assert_eq!(*worker.slot_state().borrow(), SlotState::Idle);
    }

    #[tokio::test]
    async fn test_transient_failure_requests_requeue() {
        let mut broker = MockMessageBroker::new();
        broker
            .expect_next_delivery()
            .returning(|| Ok(Some(Delivery::new("1-0", r#"{"value":"transient"}"#))));
        broker.expect_ack().never();
        broker
            .expect_reject()
            .withf(|_, requeue, reason| *requeue && reason.contains("downstream timeout"))
            .times(1)
            .returning(|_, _, _| Ok(RejectOutcome::Requeued));

        let worker = worker(Arc::new(broker));
        assert_eq!(
            worker.poll_once().await.unwrap(),
            Some(SlotState::RejectedRequeued)
        );
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dead_lettered_without_processing() {
        let mut broker = MockMessageBroker::new();
        broker
            .expect_next_delivery()
            .returning(|| Ok(Some(Delivery::new("1-0", "not json"))));
        broker
            .expect_reject()
            .withf(|_, requeue, _| !*requeue)
            .times(1)
            .returning(|_, _, _| Ok(RejectOutcome::DeadLettered));

        let processor = Arc::new(EchoProcessor::default());
        let worker: StreamWorker<EchoJob, _> =
            StreamWorker::new(Arc::new(broker), processor.clone(), "test.queue");

        assert_eq!(
            worker.poll_once().await.unwrap(),
            Some(SlotState::RejectedDeadLettered)
        );
        assert_eq!(processor.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_poll_returns_none() {
        let mut broker = MockMessageBroker::new();
        broker.expect_next_delivery().returning(|| Ok(None));

        let worker = worker(Arc::new(broker));
        assert_eq!(worker.poll_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_settle_failure_propagates_and_resets_slot() {
        let mut broker = MockMessageBroker::new();
        broker
            .expect_next_delivery()
            .returning(|| Ok(Some(Delivery::new("1-0", r#"{"value":"ok"}"#))));
        broker
            .expect_ack()
            .withf(|d| d.stream_id == "1-0")
            .returning(|_| Err(StreamError::Internal("connection reset".into())));

        let worker = worker(Arc::new(broker));
        assert!(worker.poll_once().await.is_err());
        assert_eq!(*worker.slot_state().borrow(), SlotState::Idle);
    }

    #[tokio::test]
    async fn test_run_drains_then_shuts_down() {
        let broker = Arc::new(InMemoryBroker::new().with_block_timeout(Duration::from_millis(10)));
        broker.enqueue(r#"{"value":"ok"}"#);
        broker.enqueue(r#"{"value":"permanent"}"#);

        let processor = Arc::new(EchoProcessor::default());
        let worker: StreamWorker<EchoJob, _> =
            StreamWorker::new(broker.clone(), processor.clone(), "test.queue");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.acked().len() + broker.dead_letters().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(broker.acked().len(), 1);
        assert_eq!(broker.dead_letters().len(), 1);
        assert!(broker.is_closed());
        assert!(processor.shut_down.load(Ordering::SeqCst));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(20), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn test_slot_state_names() {
        assert_eq!(SlotState::RejectedDeadLettered.to_string(), "rejected_dead_lettered");
        assert_eq!(
            SlotState::from(RejectOutcome::Requeued),
            SlotState::RejectedRequeued
        );
    }
}
