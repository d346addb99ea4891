//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers. The sampling worker owns everything mutable; the
//! handlers only read through the shared metric sink and the tick stats.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use nickstat_exporter::sink::MetricsSink;
use nickstat_exporter::TickStats;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// Reader side of the metric sink the worker publishes to.
    pub metrics: MetricsSink,
    pub tick_stats: Arc<TickStats>,
    pub config: Arc<Config>,
    pub hostname: String,
    pub http_requests: AtomicU64,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        metrics: MetricsSink,
        tick_stats: Arc<TickStats>,
        config: Config,
        hostname: String,
    ) -> Self {
        Self {
            metrics,
            tick_stats,
            config: Arc::new(config),
            hostname,
            http_requests: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Uptime rendered as `XhYmZs`.
    pub fn uptime_string(&self) -> String {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let hours = uptime_secs / 3600;
        let minutes = (uptime_secs % 3600) / 60;
        let seconds = uptime_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}
