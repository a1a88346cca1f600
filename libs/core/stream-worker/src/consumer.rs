//! Redis Streams broker
//!
//! Implements [`MessageBroker`] on a consumer group. Reads one entry at a
//! time so a consumer never holds more than one unacknowledged delivery.
//!
//! Delivery order on each poll:
//! 1. this consumer's own unacknowledged entries (left over from a restart
//!    with the same consumer ID)
//! 2. entries other consumers abandoned for longer than the claim timeout
//! 3. new entries (`XREADGROUP ... >`), blocking up to the block timeout
//!
//! Entries recovered in steps 1 and 2 carry the deliveries that were never
//! settled. Once that exceeds `max_deliveries` they go to the dead-letter
//! stream without being processed again.

use crate::broker::{
    EXHAUSTED_REASON, MessageBroker, RejectOutcome, deliveries_exhausted, reject_outcome,
};
use crate::config::WorkerConfig;
use crate::dlq::DlqManager;
use crate::error::StreamError;
use crate::event::Delivery;
use crate::metrics::StreamMetrics;
use crate::registry::MessageField;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

type StreamEntries = Vec<(String, Vec<(String, String)>)>;
type StreamReply = Vec<(String, StreamEntries)>;
/// `XPENDING` extended form: (id, owner, idle ms, times delivered)
type PendingEntry = (String, String, i64, i64);
/// `XPENDING` summary form: (count, min id, max id, per-consumer counts)
type PendingSummary = (i64, Option<String>, Option<String>, Option<Vec<(String, i64)>>);

/// What closing a consumer does to the shared stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseAction {
    Keep,
    RemoveConsumer,
    DeleteStream,
}

/// Non-durable streams go away with their last consumer once nothing is
/// pending. A consumer still owning unacknowledged entries stays registered
/// so another consumer can claim them.
fn close_action(
    durable: bool,
    own_pending: i64,
    other_consumers: usize,
    group_pending: i64,
) -> CloseAction {
    if durable || own_pending > 0 {
        CloseAction::Keep
    } else if other_consumers > 0 || group_pending > 0 {
        CloseAction::RemoveConsumer
    } else {
        CloseAction::DeleteStream
    }
}

fn unsettled(times_delivered: i64) -> u32 {
    u32::try_from(times_delivered.max(0)).unwrap_or(u32::MAX)
}

fn consumer_name(entry: &HashMap<String, Value>) -> Option<String> {
    match entry.get("name")? {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(name) => Some(name.clone()),
        _ => None,
    }
}

/// Redis Streams implementation of the broker contract
pub struct RedisBroker {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
    dlq: DlqManager,
    metrics: StreamMetrics,
    own_pending_drained: AtomicBool,
}

impl RedisBroker {
    pub fn new(redis: Arc<ConnectionManager>, config: WorkerConfig) -> Self {
        let dlq = DlqManager::new(redis.clone(), &config.stream_name, &config.dlq_stream);
        let metrics = StreamMetrics::new(&config.stream_name);
        Self {
            redis,
            config,
            dlq,
            metrics,
            own_pending_drained: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn dlq(&self) -> &DlqManager {
        &self.dlq
    }

    /// Create the consumer group (and the stream) if missing
    pub async fn init_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    durable = self.config.durable,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Oldest pending entry idle for at least `min_idle_ms`, optionally of one consumer
    async fn oldest_pending(
        &self,
        min_idle_ms: u64,
        consumer: Option<&str>,
    ) -> Result<Option<PendingEntry>, StreamError> {
        let mut conn = (*self.redis).clone();

        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(1);
        if let Some(consumer) = consumer {
            cmd.arg(consumer);
        }

        let pending: RedisResult<Vec<PendingEntry>> = cmd.query_async(&mut conn).await;
        match pending {
            Ok(p) => Ok(p.into_iter().next()),
            Err(e) if e.to_string().contains("NOGROUP") => Ok(None),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// One of this consumer's own unacknowledged entries, if any.
    ///
    /// Read with `XRANGE` so the pending list's delivery counter is the
    /// number of earlier, unsettled deliveries.
    async fn read_own_pending(&self) -> Result<Option<Delivery>, StreamError> {
        let mut conn = (*self.redis).clone();

        loop {
            let Some((id, _, _, times_delivered)) = self
                .oldest_pending(0, Some(self.config.consumer_id.as_str()))
                .await?
            else {
                return Ok(None);
            };

            let entries: StreamEntries = redis::cmd("XRANGE")
                .arg(&self.config.stream_name)
                .arg(&id)
                .arg(&id)
                .query_async(&mut conn)
                .await?;

            match self.parse_entries(entries).into_iter().next() {
                Some(delivery) => {
                    info!(
                        stream_id = %id,
                        times_delivered,
                        "Resuming own unacknowledged message"
                    );
                    return Ok(Some(delivery.with_unsettled_deliveries(unsettled(times_delivered))));
                }
                None => {
                    // trimmed or malformed; nothing left to process
                    warn!(stream_id = %id, "Dropping unreadable pending entry");
                    self.xack(&id).await?;
                }
            }
        }
    }

    /// Claim one entry another consumer left unacknowledged past the claim timeout
    async fn claim_abandoned(&self) -> Result<Option<Delivery>, StreamError> {
        let Some((id, owner, idle_ms, times_delivered)) = self
            .oldest_pending(self.config.claim_timeout_ms, None)
            .await?
        else {
            return Ok(None);
        };

        let mut conn = (*self.redis).clone();
        let entries: StreamEntries = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_timeout_ms)
            .arg(&id)
            .query_async(&mut conn)
            .await?;

        let delivery = self
            .parse_entries(entries)
            .into_iter()
            .next()
            .map(|d| d.with_unsettled_deliveries(unsettled(times_delivered)));
        if delivery.is_some() {
            warn!(
                stream_id = %id,
                previous_owner = %owner,
                idle_ms,
                times_delivered,
                "Claimed abandoned message"
            );
            self.metrics.message_claimed();
        }
        Ok(delivery)
    }

    /// Next new entry, blocking up to the configured timeout
    async fn read_new(&self) -> Result<Option<Delivery>, StreamError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<Option<StreamReply>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(streams)) => Ok(self.first_delivery(streams)),
            Ok(None) => Ok(None),
            Err(e) if e.to_string().contains("NOGROUP") => {
                warn!(stream = %self.config.stream_name, "Consumer group missing, recreating");
                self.init_consumer_group().await?;
                Ok(None)
            }
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    async fn xack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Re-add a copy with a bumped delivery count and acknowledge the original, atomically
    async fn requeue(&self, delivery: &Delivery) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let _: () = redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.config.max_length)
            .arg("*")
            .arg(MessageField::Body.as_ref())
            .arg(&delivery.body)
            .arg(MessageField::DeliveryCount.as_ref())
            .arg(delivery.delivery_count + 1)
            .arg(MessageField::OriginalId.as_ref())
            .arg(delivery.message_id())
            .arg(MessageField::EnqueuedAt.as_ref())
            .arg(delivery.enqueued_at.to_rfc3339())
            .ignore()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&delivery.stream_id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), StreamError> {
        self.dlq.move_to_dlq(delivery, reason).await?;
        self.xack(&delivery.stream_id).await?;
        self.metrics.dead_lettered(reason);
        Ok(())
    }

    /// Queue depth and pending count for monitoring
    pub async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut conn = (*self.redis).clone();

        let length: i64 = conn.xlen(&self.config.stream_name).await?;

        let pending_count = self
            .pending_summary()
            .await
            .map(|(count, _, _, _)| count)
            .unwrap_or(0);
        self.metrics.stream_depth(length);

        Ok(StreamInfo {
            stream_name: self.config.stream_name.clone(),
            consumer_group: self.config.consumer_group.clone(),
            consumer_id: self.config.consumer_id.clone(),
            length,
            pending_count,
        })
    }

    async fn pending_summary(&self) -> Result<PendingSummary, StreamError> {
        let mut conn = (*self.redis).clone();
        let summary = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;
        Ok(summary)
    }

    /// Consumers in the group other than this one
    async fn other_consumers(&self) -> Result<usize, StreamError> {
        let mut conn = (*self.redis).clone();
        let consumers: Vec<HashMap<String, Value>> = redis::cmd("XINFO")
            .arg("CONSUMERS")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        Ok(consumers
            .iter()
            .filter_map(consumer_name)
            .filter(|name| name != &self.config.consumer_id)
            .count())
    }

    fn first_delivery(&self, streams: StreamReply) -> Option<Delivery> {
        streams
            .into_iter()
            .flat_map(|(_, entries)| self.parse_entries(entries))
            .next()
    }

    fn parse_entries(&self, entries: StreamEntries) -> Vec<Delivery> {
        entries
            .into_iter()
            .filter_map(|(stream_id, fields)| {
                let delivery = Delivery::from_fields(stream_id.clone(), &fields);
                if delivery.is_none() {
                    warn!(
                        stream_id = %stream_id,
                        fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                        "Missing 'body' field in message"
                    );
                }
                delivery
            })
            .collect()
    }

    /// Dead-letter `delivery` if it outlived the TTL. Returns whether it did.
    async fn expire_if_stale(&self, delivery: &Delivery) -> Result<bool, StreamError> {
        if !delivery.is_expired(self.config.message_ttl_ms) {
            return Ok(false);
        }
        info!(
            message_id = %delivery.message_id(),
            age_ms = delivery.age_ms(),
            "Message expired before processing"
        );
        self.dead_letter(delivery, "expired").await?;
        Ok(true)
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn setup(&self) -> Result<(), StreamError> {
        self.init_consumer_group().await
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, StreamError> {
        let mut delivery = None;

        if !self.own_pending_drained.load(Ordering::Relaxed) {
            delivery = self.read_own_pending().await?;
            if delivery.is_none() {
                self.own_pending_drained.store(true, Ordering::Relaxed);
            }
        }
        if delivery.is_none() {
            delivery = self.claim_abandoned().await?;
        }
        if delivery.is_none() {
            delivery = self.read_new().await?;
        }

        match delivery {
            Some(d) if self.expire_if_stale(&d).await? => Ok(None),
            Some(d) if deliveries_exhausted(&d, self.config.max_deliveries) => {
                warn!(
                    message_id = %d.message_id(),
                    delivery_count = d.delivery_count,
                    max_deliveries = self.config.max_deliveries,
                    "Recovered message has no deliveries left"
                );
                self.dead_letter(&d, EXHAUSTED_REASON).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StreamError> {
        self.xack(&delivery.stream_id).await?;
        debug!(stream_id = %delivery.stream_id, "Acknowledged message");
        Ok(())
    }

    async fn reject(
        &self,
        delivery: &Delivery,
        requeue: bool,
        reason: &str,
    ) -> Result<RejectOutcome, StreamError> {
        let outcome = reject_outcome(delivery, requeue, self.config.max_deliveries);
        match outcome {
            RejectOutcome::Requeued => {
                self.requeue(delivery).await?;
                self.metrics.requeued();
                debug!(
                    message_id = %delivery.message_id(),
                    next_delivery = delivery.delivery_count + 1,
                    "Requeued message"
                );
            }
            RejectOutcome::DeadLettered => self.dead_letter(delivery, reason).await?,
        }
        Ok(outcome)
    }

    async fn ping(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StreamError> {
        if self.config.durable {
            return Ok(());
        }

        let (group_pending, _, _, per_consumer) = match self.pending_summary().await {
            Ok(summary) => summary,
            Err(StreamError::Redis(e)) if e.to_string().contains("NOGROUP") => return Ok(()),
            Err(e) => return Err(e),
        };
        let own_pending = per_consumer
            .unwrap_or_default()
            .into_iter()
            .find(|(name, _)| name == &self.config.consumer_id)
            .map(|(_, count)| count)
            .unwrap_or(0);
        let others = self.other_consumers().await?;

        let mut conn = (*self.redis).clone();
        match close_action(self.config.durable, own_pending, others, group_pending) {
            CloseAction::Keep => {
                warn!(
                    consumer = %self.config.consumer_id,
                    own_pending,
                    "Leaving consumer registered with unacknowledged messages"
                );
            }
            CloseAction::RemoveConsumer => {
                let _: i64 = redis::cmd("XGROUP")
                    .arg("DELCONSUMER")
                    .arg(&self.config.stream_name)
                    .arg(&self.config.consumer_group)
                    .arg(&self.config.consumer_id)
                    .query_async(&mut conn)
                    .await?;
                info!(
                    consumer = %self.config.consumer_id,
                    other_consumers = others,
                    "Removed consumer from non-durable stream"
                );
            }
            CloseAction::DeleteStream => {
                let _: i64 = conn.del(&self.config.stream_name).await?;
                info!(stream = %self.config.stream_name, "Deleted non-durable stream");
            }
        }
        Ok(())
    }
}

/// Stream information
#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamInfo {
    pub stream_name: String,
    pub consumer_group: String,
    pub consumer_id: String,
    pub length: i64,
    pub pending_count: i64,
}
