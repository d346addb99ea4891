//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! tick statistics as plain text. The status code reflects whether the
//! worker is still producing ticks.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use nickstat_exporter::TickStatsSnapshot;
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Ticks the worker may miss before it is reported unhealthy.
const STALE_TICKS: i64 = 3;

/// Short health verdict for the given snapshot.
///
/// Before the first tick the exporter is healthy for a grace period of
/// `STALE_TICKS` intervals; afterwards the last tick must be that recent.
pub fn verdict(
    snapshot: &TickStatsSnapshot,
    now_unix: i64,
    uptime_secs: u64,
    interval_secs: u64,
) -> (StatusCode, &'static str) {
    let limit = STALE_TICKS * interval_secs.max(1) as i64;
    match snapshot.last_tick_unix {
        Some(last) if now_unix - last <= limit => (StatusCode::OK, "OK"),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "Sampling stalled"),
        None if (uptime_secs as i64) <= limit => (StatusCode::OK, "OK - waiting for first tick"),
        None => (StatusCode::SERVICE_UNAVAILABLE, "No tick completed"),
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.record_http_request();

    let snapshot = state.tick_stats.snapshot();
    let interval = state.config.interval_seconds();
    let (status, message) = verdict(
        &snapshot,
        chrono::Utc::now().timestamp(),
        state.start_time.elapsed().as_secs(),
        interval,
    );

    let mut out = String::new();
    writeln!(out, "{message}").ok();
    writeln!(out).ok();
    writeln!(out, "{:22} {}", "Hostname:", state.hostname).ok();
    writeln!(out, "{:22} {}", "Uptime:", state.uptime_string()).ok();
    writeln!(out, "{:22} {}s", "Interval:", interval).ok();
    writeln!(out, "{:22} {}", "Ticks:", snapshot.ticks).ok();
    let last_tick = match snapshot.last_tick_unix {
        Some(ts) => format!("{}s ago", chrono::Utc::now().timestamp() - ts),
        None => "never".to_string(),
    };
    writeln!(out, "{:22} {}", "Last tick:", last_tick).ok();
    writeln!(out, "{:22} {:.2?}", "Last tick duration:", snapshot.last_duration).ok();
    writeln!(out, "{:22} {}", "Processes scanned:", snapshot.last_scanned).ok();
    writeln!(out, "{:22} {}", "Records published:", snapshot.last_records).ok();
    writeln!(out, "{:22} {}", "Vanished (total):", snapshot.vanished_total).ok();
    writeln!(out, "{:22} {}", "Sink errors (total):", snapshot.sink_errors).ok();
    writeln!(
        out,
        "{:22} {}",
        "HTTP requests:",
        state.http_requests.load(std::sync::atomic::Ordering::Relaxed)
    )
    .ok();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        out,
    )
}
