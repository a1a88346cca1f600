//! Configuration for the recommender

use core_config::server::ServerConfig;
use core_config::{ConfigError, Environment, FromEnv, env_optional};
use domain_recipes::{RecommendationStream, SearchConfig};
use domain_vector::{EmbeddingConfig, QdrantConfig};
use stream_worker::QueueConfig;

/// Everything the commands share; the generator is configured separately
/// because only the worker talks to it.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub embedding: EmbeddingConfig,
    pub qdrant: QdrantConfig,
    pub search: SearchConfig,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            queue: QueueConfig::from_env_for::<RecommendationStream>()?,
            embedding: EmbeddingConfig::from_env()?,
            qdrant: QdrantConfig::from_env()?,
            search: SearchConfig::from_env()?,
        })
    }
}

/// Consumer name within the group: the pod/host name when there is one
pub fn consumer_id() -> Option<String> {
    env_optional("HOSTNAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(
            [
                "REDIS_URL",
                "JOB_QUEUE",
                "RESPONSE_QUEUE",
                "DEAD_LETTER_QUEUE",
                "MAX_DELIVERIES",
                "VECTOR_DIMENSION",
                "VECTOR_DB_NAME",
                "DEFAULT_TOP_K",
                "PORT",
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.queue.job_queue, "recommendation.queue");
                assert_eq!(config.queue.response_queue, "response.queue");
                assert_eq!(config.queue.dead_letter_queue, "recommendation.queue.dlq");
                assert_eq!(config.queue.max_deliveries, 1);
                assert_eq!(config.embedding.dimension, 1024);
                assert_eq!(config.qdrant.collection, "recipes");
                assert_eq!(config.search.top_k, 500);
                assert_eq!(config.server.port, 8080);
            },
        );
    }

    #[test]
    fn test_invalid_queue_settings_fail() {
        temp_env::with_var("MAX_DELIVERIES", Some("0"), || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn test_results_published_onto_job_queue_fail() {
        temp_env::with_vars(
            [
                ("JOB_QUEUE", Some("recommendation.queue")),
                ("RESPONSE_QUEUE", Some("recommendation.queue")),
            ],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_consumer_id_from_hostname() {
        temp_env::with_var("HOSTNAME", Some("recommender-7f9c"), || {
            assert_eq!(consumer_id().as_deref(), Some("recommender-7f9c"));
        });
        temp_env::with_var_unset("HOSTNAME", || {
            assert_eq!(consumer_id(), None);
        });
    }
}
