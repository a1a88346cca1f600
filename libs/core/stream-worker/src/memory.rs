//! In-process broker and publisher
//!
//! Same delivery contract as the Redis implementations (prefetch of one,
//! TTL expiry, delivery-count dead-lettering, recovery of unsettled
//! deliveries) without a server. Used by
//! pipeline tests and for dry runs.

use crate::broker::{
    EXHAUSTED_REASON, MessageBroker, MessagePublisher, RejectOutcome, deliveries_exhausted,
    reject_outcome,
};
use crate::error::StreamError;
use crate::event::Delivery;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct BrokerState {
    queue: VecDeque<Delivery>,
    in_flight: Option<Delivery>,
    acked: Vec<Delivery>,
    requeued: usize,
    dead_letters: Vec<(Delivery, String)>,
    seq: u64,
    closed: bool,
}

impl BrokerState {
    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("{}-{}", Utc::now().timestamp_millis(), self.seq)
    }
}

/// Queue held in memory
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    arrived: Notify,
    max_deliveries: u32,
    message_ttl_ms: Option<u64>,
    block_timeout: Duration,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            arrived: Notify::new(),
            max_deliveries: 1,
            message_ttl_ms: None,
            block_timeout: Duration::from_millis(50),
        }
    }

    pub fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = max.max(1);
        self
    }

    pub fn with_message_ttl_ms(mut self, ttl: Option<u64>) -> Self {
        self.message_ttl_ms = ttl;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a raw body; returns its message ID
    pub fn enqueue(&self, body: impl Into<String>) -> String {
        let id = {
            let mut state = self.lock();
            let id = state.next_id();
            state.queue.push_back(Delivery::new(id.clone(), body));
            id
        };
        self.arrived.notify_one();
        id
    }

    /// Enqueue a pre-built delivery (tests use this to age messages)
    pub fn enqueue_delivery(&self, delivery: Delivery) {
        self.lock().queue.push_back(delivery);
        self.arrived.notify_one();
    }

    /// Messages waiting to be delivered
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn in_flight(&self) -> Option<Delivery> {
        self.lock().in_flight.clone()
    }

    pub fn acked(&self) -> Vec<Delivery> {
        self.lock().acked.clone()
    }

    pub fn requeued(&self) -> usize {
        self.lock().requeued
    }

    /// Dead-lettered deliveries with their reasons
    pub fn dead_letters(&self) -> Vec<(Delivery, String)> {
        self.lock().dead_letters.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop the in-flight delivery unsettled, as a crashed consumer would.
    ///
    /// The entry goes back to the front of the queue with the lost delivery
    /// counted. Returns whether there was one.
    pub fn abandon_in_flight(&self) -> bool {
        let mut state = self.lock();
        match state.in_flight.take() {
            Some(delivery) => {
                state.queue.push_front(delivery.with_unsettled_deliveries(1));
                true
            }
            None => false,
        }
    }

    fn settle(&self, delivery: &Delivery) -> Result<Delivery, StreamError> {
        let mut state = self.lock();
        match state.in_flight.take() {
            Some(current) if current.stream_id == delivery.stream_id => Ok(current),
            other => {
                state.in_flight = other;
                Err(StreamError::Internal(format!(
                    "delivery {} is not in flight",
                    delivery.stream_id
                )))
            }
        }
    }

    fn take_next(&self) -> Result<Option<Delivery>, StreamError> {
        let mut state = self.lock();
        if let Some(current) = &state.in_flight {
            return Err(StreamError::Internal(format!(
                "delivery {} is still unacknowledged",
                current.stream_id
            )));
        }

        while let Some(delivery) = state.queue.pop_front() {
            if delivery.is_expired(self.message_ttl_ms) {
                debug!(message_id = %delivery.message_id(), "Message expired before delivery");
                state.dead_letters.push((delivery, "expired".to_string()));
                continue;
            }
            if deliveries_exhausted(&delivery, self.max_deliveries) {
                debug!(message_id = %delivery.message_id(), "Message has no deliveries left");
                state.dead_letters.push((delivery, EXHAUSTED_REASON.to_string()));
                continue;
            }
            state.in_flight = Some(delivery.clone());
            return Ok(Some(delivery));
        }
        Ok(None)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn setup(&self) -> Result<(), StreamError> {
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, StreamError> {
        if let Some(delivery) = self.take_next()? {
            return Ok(Some(delivery));
        }
        let _ = tokio::time::timeout(self.block_timeout, self.arrived.notified()).await;
        self.take_next()
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StreamError> {
        let settled = self.settle(delivery)?;
        self.lock().acked.push(settled);
        Ok(())
    }

    async fn reject(
        &self,
        delivery: &Delivery,
        requeue: bool,
        reason: &str,
    ) -> Result<RejectOutcome, StreamError> {
        let settled = self.settle(delivery)?;
        let outcome = reject_outcome(&settled, requeue, self.max_deliveries);

        let mut state = self.lock();
        match outcome {
            RejectOutcome::Requeued => {
                let mut again = settled;
                again.stream_id = state.next_id();
                again.delivery_count += 1;
                state.queue.push_back(again);
                state.requeued += 1;
            }
            RejectOutcome::DeadLettered => {
                state.dead_letters.push((settled, reason.to_string()));
            }
        }
        Ok(outcome)
    }

    async fn ping(&self) -> Result<(), StreamError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StreamError> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Publisher that records bodies instead of sending them
pub struct InMemoryPublisher {
    destination: String,
    messages: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl InMemoryPublisher {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            messages: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    /// A publisher whose every publish fails with `reason`
    pub fn failing(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::new(destination)
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryPublisher {
    fn destination(&self) -> &str {
        &self.destination
    }

    async fn publish(&self, body: &str) -> Result<String, StreamError> {
        if let Some(reason) = &self.fail_with {
            return Err(StreamError::transient(reason.clone()));
        }
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push(body.to_string());
        Ok(format!("{}-{}", Utc::now().timestamp_millis(), messages.len()))
    }
}
