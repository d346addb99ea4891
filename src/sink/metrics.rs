//! Prometheus gauges for the records of the latest tick.
//!
//! All per-entity gauges live behind one mutex. Publishing a tick holds it
//! while every vec is reset and the new values are installed; rendering holds
//! it while the registry is gathered and encoded. A scrape therefore sees
//! either the previous tick or the new one, never a mix, and series of
//! vanished entities disappear with the tick that no longer reports them.

use prometheus::{Counter, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::SinkError;
use crate::sampler::PassStats;
use crate::sink::SummarySink;
use crate::summary::{LabelMode, SummaryRecord};

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Name and help of the gauge for each field, in `ProcMetrics::NAMES` order.
const GAUGES: [(&str, &str); 7] = [
    (
        "nickstat_cpu_percent",
        "CPU usage (user+system) over the last interval, percent of one core",
    ),
    (
        "nickstat_cpu_user_percent",
        "User CPU usage over the last interval, percent of one core",
    ),
    (
        "nickstat_cpu_system_percent",
        "System CPU usage over the last interval, percent of one core",
    ),
    (
        "nickstat_cpu_iowait_percent",
        "Block I/O wait over the last interval, percent of one core",
    ),
    ("nickstat_num_threads", "Number of threads"),
    ("nickstat_memory_vms_kb", "Virtual memory size in KiB"),
    ("nickstat_memory_rss_kb", "Resident set size in KiB"),
];

/// One gauge vec per numeric field of a record.
struct ProcessGauges {
    vecs: Vec<GaugeVec>,
}

impl ProcessGauges {
    fn new(registry: &Registry, mode: LabelMode) -> Result<Self, prometheus::Error> {
        let labels = ["hostname", "nickname", mode.label_name()];
        let mut vecs = Vec::with_capacity(GAUGES.len());
        for (name, help) in GAUGES {
            let vec = GaugeVec::new(Opts::new(name, help), &labels)?;
            registry.register(Box::new(vec.clone()))?;
            vecs.push(vec);
        }
        Ok(Self { vecs })
    }

    fn reset(&self) {
        for vec in &self.vecs {
            vec.reset();
        }
    }

    fn install(&self, record: &SummaryRecord, mode: LabelMode) {
        let labels = record.labels(mode);
        let values = [
            labels[0].1.as_str(),
            labels[1].1.as_str(),
            labels[2].1.as_str(),
        ];
        for (vec, (_, value)) in self.vecs.iter().zip(record.metrics.iter()) {
            vec.with_label_values(&values).set(value);
        }
    }
}

/// Self-observation of the exporter, registered next to the process gauges.
#[derive(Clone)]
pub struct ExporterTelemetry {
    pub tick_duration: Gauge,
    pub processes_scanned: Gauge,
    pub records_published: Gauge,
    pub last_tick_timestamp: Gauge,
    pub ticks_total: Counter,
    pub vanished_total: Counter,
    pub sink_errors_total: Counter,
}

impl ExporterTelemetry {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let tick_duration = Gauge::new(
            "nickstat_exporter_tick_duration_seconds",
            "Time spent in the last sampling pass",
        )?;
        let processes_scanned = Gauge::new(
            "nickstat_exporter_processes_scanned",
            "Number of pids listed in the last sampling pass",
        )?;
        let records_published = Gauge::new(
            "nickstat_exporter_records_published",
            "Number of summary records published in the last tick",
        )?;
        let last_tick_timestamp = Gauge::new(
            "nickstat_exporter_last_tick_timestamp_seconds",
            "Unix time of the last completed tick",
        )?;
        let ticks_total = Counter::new("nickstat_exporter_ticks_total", "Completed ticks")?;
        let vanished_total = Counter::new(
            "nickstat_exporter_vanished_total",
            "Tracked processes dropped because they disappeared",
        )?;
        let sink_errors_total = Counter::new(
            "nickstat_exporter_sink_errors_total",
            "Ticks a sink failed to publish",
        )?;

        registry.register(Box::new(tick_duration.clone()))?;
        registry.register(Box::new(processes_scanned.clone()))?;
        registry.register(Box::new(records_published.clone()))?;
        registry.register(Box::new(last_tick_timestamp.clone()))?;
        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(vanished_total.clone()))?;
        registry.register(Box::new(sink_errors_total.clone()))?;

        Ok(Self {
            tick_duration,
            processes_scanned,
            records_published,
            last_tick_timestamp,
            ticks_total,
            vanished_total,
            sink_errors_total,
        })
    }

    /// Records the outcome of one pass.
    pub fn record_tick(&self, stats: &PassStats, duration: Duration) {
        self.tick_duration.set(duration.as_secs_f64());
        self.processes_scanned.set(stats.scanned as f64);
        self.records_published.set(stats.records as f64);
        self.last_tick_timestamp
            .set(chrono::Utc::now().timestamp() as f64);
        self.ticks_total.inc();
        self.vanished_total.inc_by(stats.vanished as f64);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors_total.inc();
    }
}

/// Metric sink; clones share the same registry and lock.
#[derive(Clone)]
pub struct MetricsSink {
    registry: Registry,
    gauges: Arc<Mutex<ProcessGauges>>,
    telemetry: ExporterTelemetry,
    mode: LabelMode,
}

impl MetricsSink {
    /// Creates and registers all metrics in a fresh registry.
    pub fn new(mode: LabelMode) -> Result<Self, SinkError> {
        let registry = Registry::new();
        let gauges = ProcessGauges::new(&registry, mode)?;
        let telemetry = ExporterTelemetry::new(&registry)?;
        Ok(Self {
            registry,
            gauges: Arc::new(Mutex::new(gauges)),
            telemetry,
            mode,
        })
    }

    pub fn telemetry(&self) -> &ExporterTelemetry {
        &self.telemetry
    }

    /// Encodes the current metric set in the Prometheus text format.
    pub fn render(&self) -> Result<String, SinkError> {
        let _guard = self.gauges.lock().map_err(|_| SinkError::Poisoned)?;
        let families = self.registry.gather();
        let mut buffer = Vec::with_capacity(BUFFER_CAP);
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl SummarySink for MetricsSink {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn publish(&mut self, records: &[SummaryRecord]) -> Result<(), SinkError> {
        let gauges = self.gauges.lock().map_err(|_| SinkError::Poisoned)?;
        gauges.reset();
        for record in records {
            gauges.install(record, self.mode);
        }
        Ok(())
    }
}
