//! Redis connection setup with startup retry

use crate::error::StreamError;
use redis::Client;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const INITIAL_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 5_000;

/// Connect and verify with PING.
///
/// The returned `ConnectionManager` reconnects on its own after this point.
pub async fn connect(url: &str) -> Result<Arc<ConnectionManager>, StreamError> {
    debug!("Connecting to Redis");

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(Arc::new(manager))
}

/// [`connect`] with exponential backoff, for brokers that start after us
pub async fn connect_with_retry(
    url: &str,
    max_retries: u32,
) -> Result<Arc<ConnectionManager>, StreamError> {
    retry_with_backoff(|| connect(url), max_retries).await
}

async fn retry_with_backoff<F, Fut, T, E>(mut operation: F, max_retries: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY_MS;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    warn!(attempts = attempt, error = %e, "Giving up");
                    return Err(e);
                }

                debug!(attempt, max_retries, delay_ms = delay, error = %e, "Retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
