//! Prometheus metrics for stream workers

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call once at startup. Later calls are no-ops; if another recorder is
/// already installed a warning is logged and `/metrics` stays empty.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!("Prometheus metrics initialized");
        }
        Err(e) => warn!(error = %e, "Prometheus recorder not installed"),
    }
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Per-stream metric labels
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    stream_name: String,
}

impl StreamMetrics {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
        }
    }

    pub fn job_received(&self) {
        counter!("stream_worker_jobs_received_total", "stream" => self.stream_name.clone())
            .increment(1);
    }

    /// Record a terminal slot state and how long the job took to get there
    pub fn job_finished(&self, state: &'static str, duration: Duration) {
        counter!(
            "stream_worker_jobs_processed_total",
            "stream" => self.stream_name.clone(),
            "state" => state
        )
        .increment(1);

        histogram!(
            "stream_worker_job_duration_seconds",
            "stream" => self.stream_name.clone(),
            "state" => state
        )
        .record(duration.as_secs_f64());
    }

    pub fn job_error(&self, category: &'static str) {
        counter!(
            "stream_worker_job_errors_total",
            "stream" => self.stream_name.clone(),
            "category" => category
        )
        .increment(1);
    }

    pub fn requeued(&self) {
        counter!("stream_worker_jobs_requeued_total", "stream" => self.stream_name.clone())
            .increment(1);
    }

    pub fn dead_lettered(&self, reason: &str) {
        let reason = if reason == "expired" { "expired" } else { "rejected" };
        counter!(
            "stream_worker_jobs_dlq_total",
            "stream" => self.stream_name.clone(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn message_claimed(&self) {
        counter!("stream_worker_messages_claimed_total", "stream" => self.stream_name.clone())
            .increment(1);
    }

    pub fn stream_depth(&self, depth: i64) {
        gauge!("stream_worker_stream_depth", "stream" => self.stream_name.clone())
            .set(depth as f64);
    }
}
