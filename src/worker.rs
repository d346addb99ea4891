//! The sampling worker: turns scheduled ticks into published records.
//!
//! The worker owns the sampler and every sink and runs on its own OS thread,
//! so a slow pass never blocks the async runtime that serves scrapes. It
//! pulls tick times from the pacemaker channel, sleeps until each one is due
//! and runs one pass per tick. Sink failures are logged and counted; the
//! worker keeps going with the remaining sinks and the next tick.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::process::ProcessInfoProvider;
use crate::sampler::{PassStats, Sampler};
use crate::scheduler::{wait_until, window_timestamp};
use crate::sink::{ExporterTelemetry, SummarySink};

/// Lock-free view of the latest ticks, read by the health endpoint.
#[derive(Debug, Default)]
pub struct TickStats {
    ticks: AtomicU64,
    last_tick_unix: AtomicI64,
    last_duration_us: AtomicU64,
    last_scanned: AtomicUsize,
    last_records: AtomicUsize,
    vanished_total: AtomicU64,
    sink_errors: AtomicU64,
}

/// Point-in-time copy of [`TickStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStatsSnapshot {
    pub ticks: u64,
    /// Unix time of the last completed tick, `None` before the first one.
    pub last_tick_unix: Option<i64>,
    pub last_duration: Duration,
    pub last_scanned: usize,
    pub last_records: usize,
    pub vanished_total: u64,
    pub sink_errors: u64,
}

impl TickStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self, stats: &PassStats, duration: Duration) {
        self.last_duration_us
            .store(duration.as_micros() as u64, Ordering::Relaxed);
        self.last_scanned.store(stats.scanned, Ordering::Relaxed);
        self.last_records.store(stats.records, Ordering::Relaxed);
        self.vanished_total
            .fetch_add(stats.vanished as u64, Ordering::Relaxed);
        self.last_tick_unix
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
        self.ticks.fetch_add(1, Ordering::Release);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TickStatsSnapshot {
        let ticks = self.ticks.load(Ordering::Acquire);
        TickStatsSnapshot {
            ticks,
            last_tick_unix: (ticks > 0).then(|| self.last_tick_unix.load(Ordering::Relaxed)),
            last_duration: Duration::from_micros(self.last_duration_us.load(Ordering::Relaxed)),
            last_scanned: self.last_scanned.load(Ordering::Relaxed),
            last_records: self.last_records.load(Ordering::Relaxed),
            vanished_total: self.vanished_total.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// Owns the sampler and the sinks for the lifetime of the exporter.
pub struct Worker<P: ProcessInfoProvider> {
    sampler: Sampler<P>,
    sinks: Vec<Box<dyn SummarySink + Send>>,
    interval: ChronoDuration,
    stats: Arc<TickStats>,
    telemetry: Option<ExporterTelemetry>,
}

impl<P: ProcessInfoProvider> Worker<P> {
    pub fn new(sampler: Sampler<P>, interval: Duration) -> Self {
        Self {
            sampler,
            sinks: Vec::new(),
            interval: ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::seconds(1)),
            stats: Arc::new(TickStats::new()),
            telemetry: None,
        }
    }

    /// Adds a sink; sinks are fed in the order they were added.
    pub fn with_sink(mut self, sink: Box<dyn SummarySink + Send>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_telemetry(mut self, telemetry: ExporterTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Shared handle on the tick statistics.
    pub fn stats(&self) -> Arc<TickStats> {
        Arc::clone(&self.stats)
    }

    pub fn sampler_mut(&mut self) -> &mut Sampler<P> {
        &mut self.sampler
    }

    /// Runs the pass for `tick` and hands the records to every sink.
    pub fn run_tick(&mut self, tick: DateTime<Local>) -> PassStats {
        let started = Instant::now();
        let timestamp = window_timestamp(tick, self.interval);
        let result = self.sampler.tick(&timestamp);

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.publish(&result.records) {
                error!("Sink '{}' failed for tick {}: {}", sink.name(), timestamp, e);
                self.stats.record_sink_error();
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_sink_error();
                }
            }
        }

        let elapsed = started.elapsed();
        self.stats.record_tick(&result.stats, elapsed);
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_tick(&result.stats, elapsed);
        }
        debug!(
            "Tick {} published {} records in {:.2?}",
            timestamp, result.stats.records, elapsed
        );
        result.stats
    }

    /// Consumes ticks until the pacemaker goes away.
    ///
    /// Must run outside the async runtime: it blocks on the channel and
    /// sleeps until each tick is due.
    pub fn run(mut self, mut ticks: mpsc::Receiver<DateTime<Local>>) {
        info!("Sampling worker started");
        while let Some(tick) = ticks.blocking_recv() {
            wait_until(tick);
            self.run_tick(tick);
        }
        info!("Tick channel closed, sampling worker exiting");
    }
}
