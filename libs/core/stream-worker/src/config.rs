//! Queue and worker configuration
//!
//! `QueueConfig` is what operators set through the environment. `WorkerConfig`
//! is what a single consumer needs at runtime, derived from it.

use crate::registry::StreamDef;
use core_config::{ConfigError, env_flag, env_or_default, env_parse, env_parse_optional};
use uuid::Uuid;

/// Broker and queue settings, loaded from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Broker connection URL (`REDIS_URL`)
    pub url: String,
    /// Inbound job stream (`JOB_QUEUE`)
    pub job_queue: String,
    /// Outbound result stream (`RESPONSE_QUEUE`)
    pub response_queue: String,
    /// Dead-letter stream (`DEAD_LETTER_QUEUE`)
    pub dead_letter_queue: String,
    /// Messages older than this are dead-lettered unprocessed (`MESSAGE_TTL_MS`)
    pub message_ttl_ms: Option<u64>,
    /// Durable queues survive consumer shutdown (`QUEUE_DURABLE`)
    pub durable: bool,
    /// Deliveries allowed before a rejected message is dead-lettered (`MAX_DELIVERIES`)
    pub max_deliveries: u32,
    /// Blocking read timeout (`QUEUE_BLOCK_TIMEOUT_MS`)
    pub block_timeout_ms: u64,
    /// Idle time before an unacknowledged delivery is reclaimed (`QUEUE_CLAIM_TIMEOUT_MS`)
    pub claim_timeout_ms: u64,
    /// Approximate stream cap (`QUEUE_MAX_LENGTH`)
    pub max_length: i64,
}

impl QueueConfig {
    /// Load from the environment, defaulting names and limits from `S`.
    pub fn from_env_for<S: StreamDef>() -> Result<Self, ConfigError> {
        let config = Self {
            url: env_or_default("REDIS_URL", "redis://127.0.0.1:6379"),
            job_queue: env_or_default("JOB_QUEUE", S::STREAM_NAME),
            response_queue: env_or_default("RESPONSE_QUEUE", S::REPLY_STREAM),
            dead_letter_queue: env_or_default("DEAD_LETTER_QUEUE", S::DLQ_STREAM),
            message_ttl_ms: env_parse_optional("MESSAGE_TTL_MS")?,
            durable: env_flag("QUEUE_DURABLE", true)?,
            max_deliveries: env_parse("MAX_DELIVERIES", 1u32)?,
            block_timeout_ms: env_parse("QUEUE_BLOCK_TIMEOUT_MS", S::BLOCK_TIMEOUT_MS)?,
            claim_timeout_ms: env_parse("QUEUE_CLAIM_TIMEOUT_MS", S::CLAIM_TIMEOUT_MS)?,
            max_length: env_parse("QUEUE_MAX_LENGTH", S::MAX_LENGTH)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.job_queue.trim().is_empty() {
            return Err(ConfigError::invalid("JOB_QUEUE", "must not be empty"));
        }
        if self.max_deliveries == 0 {
            return Err(ConfigError::invalid("MAX_DELIVERIES", "must be at least 1"));
        }
        if self.job_queue == self.dead_letter_queue {
            return Err(ConfigError::invalid(
                "DEAD_LETTER_QUEUE",
                "must differ from JOB_QUEUE",
            ));
        }
        if self.response_queue.trim().is_empty() {
            return Err(ConfigError::invalid("RESPONSE_QUEUE", "must not be empty"));
        }
        if self.response_queue == self.job_queue {
            return Err(ConfigError::invalid(
                "RESPONSE_QUEUE",
                "must differ from JOB_QUEUE",
            ));
        }
        if self.response_queue == self.dead_letter_queue {
            return Err(ConfigError::invalid(
                "RESPONSE_QUEUE",
                "must differ from DEAD_LETTER_QUEUE",
            ));
        }
        Ok(())
    }

    /// Consumer settings for one worker in `consumer_group`.
    pub fn worker_config(&self, consumer_group: impl Into<String>) -> WorkerConfig {
        WorkerConfig::new(&self.job_queue, consumer_group)
            .with_dlq_stream(&self.dead_letter_queue)
            .with_max_length(self.max_length)
            .with_block_timeout_ms(self.block_timeout_ms)
            .with_claim_timeout_ms(self.claim_timeout_ms)
            .with_message_ttl_ms(self.message_ttl_ms)
            .with_durable(self.durable)
            .with_max_deliveries(self.max_deliveries)
    }
}

/// Runtime settings for a single consumer
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Job stream name
    pub stream_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated)
    pub consumer_id: String,

    /// Dead-letter stream name
    pub dlq_stream: String,

    /// Maximum stream length before trimming
    pub max_length: i64,

    /// Blocking read timeout in milliseconds
    pub block_timeout_ms: u64,

    /// Claim timeout in milliseconds for abandoned deliveries
    pub claim_timeout_ms: u64,

    /// Message TTL in milliseconds, measured from first enqueue
    pub message_ttl_ms: Option<u64>,

    /// Non-durable streams are deleted when the consumer closes
    pub durable: bool,

    /// Deliveries allowed before a rejected message is dead-lettered
    pub max_deliveries: u32,
}

impl WorkerConfig {
    /// Create a WorkerConfig from a StreamDef
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self::new(S::STREAM_NAME, S::CONSUMER_GROUP)
            .with_dlq_stream(S::DLQ_STREAM)
            .with_max_length(S::MAX_LENGTH)
            .with_block_timeout_ms(S::BLOCK_TIMEOUT_MS)
            .with_claim_timeout_ms(S::CLAIM_TIMEOUT_MS)
    }

    pub fn new(stream_name: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        let stream_name = stream_name.into();
        Self {
            dlq_stream: format!("{}.dlq", stream_name),
            stream_name,
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            max_length: 100_000,
            block_timeout_ms: 5_000,
            claim_timeout_ms: 300_000,
            message_ttl_ms: None,
            durable: true,
            max_deliveries: 1,
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_dlq_stream(mut self, stream: impl Into<String>) -> Self {
        self.dlq_stream = stream.into();
        self
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_block_timeout_ms(mut self, timeout: u64) -> Self {
        self.block_timeout_ms = timeout;
        self
    }

    pub fn with_claim_timeout_ms(mut self, timeout: u64) -> Self {
        self.claim_timeout_ms = timeout;
        self
    }

    pub fn with_message_ttl_ms(mut self, ttl: Option<u64>) -> Self {
        self.message_ttl_ms = ttl;
        self
    }

    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = max.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecipeStream;
    impl StreamDef for RecipeStream {
        const STREAM_NAME: &'static str = "recommendation.queue";
        const CONSUMER_GROUP: &'static str = "recommenders";
        const DLQ_STREAM: &'static str = "recommendation.queue.dlq";
        const REPLY_STREAM: &'static str = "response.queue";
    }

    const QUEUE_VARS: [&str; 10] = [
        "REDIS_URL",
        "JOB_QUEUE",
        "RESPONSE_QUEUE",
        "DEAD_LETTER_QUEUE",
        "MESSAGE_TTL_MS",
        "QUEUE_DURABLE",
        "MAX_DELIVERIES",
        "QUEUE_BLOCK_TIMEOUT_MS",
        "QUEUE_CLAIM_TIMEOUT_MS",
        "QUEUE_MAX_LENGTH",
    ];

    #[test]
    fn test_queue_config_defaults_from_stream_def() {
        temp_env::with_vars_unset(QUEUE_VARS, || {
            let config = QueueConfig::from_env_for::<RecipeStream>().unwrap();
            assert_eq!(config.url, "redis://127.0.0.1:6379");
            assert_eq!(config.job_queue, "recommendation.queue");
            assert_eq!(config.response_queue, "response.queue");
            assert_eq!(config.dead_letter_queue, "recommendation.queue.dlq");
            assert_eq!(config.message_ttl_ms, None);
            assert!(config.durable);
            assert_eq!(config.max_deliveries, 1);
        });
    }

    #[test]
    fn test_queue_config_overrides() {
        temp_env::with_vars(
            [
                ("JOB_QUEUE", Some("jobs")),
                ("MESSAGE_TTL_MS", Some("60000")),
                ("QUEUE_DURABLE", Some("false")),
                ("MAX_DELIVERIES", Some("3")),
            ],
            || {
                let config = QueueConfig::from_env_for::<RecipeStream>().unwrap();
                assert_eq!(config.job_queue, "jobs");
                assert_eq!(config.message_ttl_ms, Some(60_000));
                assert!(!config.durable);
                assert_eq!(config.max_deliveries, 3);
            },
        );
    }

    #[test]
    fn test_queue_config_rejects_zero_deliveries() {
        temp_env::with_var("MAX_DELIVERIES", Some("0"), || {
            let err = QueueConfig::from_env_for::<RecipeStream>().unwrap_err();
            assert!(err.to_string().contains("MAX_DELIVERIES"));
        });
    }

    #[test]
    fn test_queue_config_rejects_dlq_equal_to_job_queue() {
        temp_env::with_vars(
            [
                ("JOB_QUEUE", Some("same")),
                ("DEAD_LETTER_QUEUE", Some("same")),
            ],
            || {
                assert!(QueueConfig::from_env_for::<RecipeStream>().is_err());
            },
        );
    }

    #[test]
    fn test_queue_config_rejects_response_queue_feeding_jobs() {
        temp_env::with_vars(
            [
                ("JOB_QUEUE", Some("recipes")),
                ("RESPONSE_QUEUE", Some("recipes")),
                ("DEAD_LETTER_QUEUE", None),
            ],
            || {
                let err = QueueConfig::from_env_for::<RecipeStream>().unwrap_err();
                assert!(err.to_string().contains("RESPONSE_QUEUE"));
            },
        );
    }

    #[test]
    fn test_queue_config_rejects_empty_response_queue() {
        temp_env::with_vars(
            [("JOB_QUEUE", None), ("RESPONSE_QUEUE", Some("  "))],
            || {
                let err = QueueConfig::from_env_for::<RecipeStream>().unwrap_err();
                assert!(err.to_string().contains("RESPONSE_QUEUE"));
            },
        );
    }

    #[test]
    fn test_queue_config_rejects_response_queue_equal_to_dlq() {
        temp_env::with_vars(
            [
                ("JOB_QUEUE", None),
                ("RESPONSE_QUEUE", Some("recommendation.queue.dlq")),
                ("DEAD_LETTER_QUEUE", None),
            ],
            || {
                assert!(QueueConfig::from_env_for::<RecipeStream>().is_err());
            },
        );
    }

    #[test]
    fn test_worker_config_from_queue_config() {
        temp_env::with_vars_unset(QUEUE_VARS, || {
            let queue = QueueConfig::from_env_for::<RecipeStream>().unwrap();
            let worker = queue.worker_config(RecipeStream::CONSUMER_GROUP);
            assert_eq!(worker.stream_name, "recommendation.queue");
            assert_eq!(worker.consumer_group, "recommenders");
            assert_eq!(worker.dlq_stream, "recommendation.queue.dlq");
            assert!(worker.consumer_id.starts_with("worker-"));
        });
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::new("jobs", "group")
            .with_consumer_id("worker-1")
            .with_max_deliveries(0)
            .with_message_ttl_ms(Some(1_000));

        assert_eq!(config.consumer_id, "worker-1");
        assert_eq!(config.dlq_stream, "jobs.dlq");
        assert_eq!(config.max_deliveries, 1);
        assert_eq!(config.message_ttl_ms, Some(1_000));
    }
}
