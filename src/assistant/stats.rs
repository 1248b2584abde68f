//! Process-lifetime chat statistics
//!
//! [`Statistics`] is the in-memory aggregator behind the health endpoint. It
//! is injected into the chat service rather than held globally, so tests and
//! embedding applications each get their own counters. Every record is also
//! mirrored to the `metrics` facade.
//!
//! # Metrics
//!
//! - `horizon_chat_requests_total`: Counter of chat requests by outcome
//! - `horizon_chat_duration_seconds`: Histogram of request handling time
//! - `horizon_chat_tokens_consumed`: Histogram of tokens per request
//! - `horizon_chat_errors_total`: Counter of failures by reason

use metrics::{histogram, increment_counter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The result of one chat request, as seen by the statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Whether the primary provider answered
    pub success: bool,
    /// Wall-clock handling time
    pub elapsed_ms: u64,
    /// Tokens reported by the provider (0 for fallback or rejection)
    pub tokens: u64,
    /// Topic label from topic detection, or a rejection marker
    pub topic: String,
    /// Reason key for failures
    pub error_reason: Option<String>,
}

impl Outcome {
    /// A request answered by the primary provider
    pub fn success(elapsed_ms: u64, tokens: u64, topic: impl Into<String>) -> Self {
        Self {
            success: true,
            elapsed_ms,
            tokens,
            topic: topic.into(),
            error_reason: None,
        }
    }

    /// A request that fell back or was rejected
    pub fn failure(elapsed_ms: u64, topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            elapsed_ms,
            tokens: 0,
            topic: topic.into(),
            error_reason: Some(reason.into()),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens_used: u64,
    /// Running mean of handling time in milliseconds
    #[serde(rename = "averageResponseTime")]
    pub average_response_time_ms: f64,
    /// Successful share of all requests as a percentage, 0 when idle
    pub success_rate: f64,
    pub topic_counts: BTreeMap<String, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

/// Thread-safe statistics aggregator
///
/// # Examples
///
/// ```
/// use horizon::assistant::{Outcome, Statistics};
///
/// let stats = Statistics::new();
/// stats.record(Outcome::success(120, 450, "relativity"));
/// stats.record(Outcome::failure(80, "black_holes", "service_unavailable"));
///
/// let snapshot = stats.snapshot();
/// assert_eq!(snapshot.total_requests, 2);
/// assert_eq!(snapshot.success_rate, 50.0);
/// ```
#[derive(Debug, Default)]
pub struct Statistics {
    inner: Mutex<StatisticsSnapshot>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the counters
    ///
    /// Never fails; a poisoned lock is recovered since every update leaves
    /// the counters consistent.
    pub fn record(&self, outcome: Outcome) {
        let status = if outcome.success { "success" } else { "failure" };
        increment_counter!("horizon_chat_requests_total", "status" => status);
        histogram!(
            "horizon_chat_duration_seconds",
            outcome.elapsed_ms as f64 / 1000.0,
            "status" => status
        );
        histogram!("horizon_chat_tokens_consumed", outcome.tokens as f64);
        if let Some(reason) = &outcome.error_reason {
            increment_counter!("horizon_chat_errors_total", "reason" => reason.clone());
        }

        let mut stats = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        stats.total_requests += 1;
        if outcome.success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }
        stats.total_tokens_used += outcome.tokens;

        let n = stats.total_requests as f64;
        stats.average_response_time_ms =
            (stats.average_response_time_ms * (n - 1.0) + outcome.elapsed_ms as f64) / n;
        stats.success_rate = stats.successful_requests as f64 / n * 100.0;

        *stats.topic_counts.entry(outcome.topic).or_insert(0) += 1;
        if let Some(reason) = outcome.error_reason {
            *stats.error_counts.entry(reason).or_insert(0) += 1;
        }
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when compiled with the `prometheus` feature; otherwise
/// the `metrics` macros record into the no-op recorder.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
