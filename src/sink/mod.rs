//! Presentation adapters fed with the records of each tick.
//!
//! - `text`: line-oriented output on any writer
//! - `metrics`: Prometheus gauges replaced atomically every tick

pub mod metrics;
pub mod text;

pub use metrics::{ExporterTelemetry, MetricsSink};
pub use text::{format_process_line, truncate_cmdline, TextSink, HEADER, PROCESS_HEADER};

use crate::error::SinkError;
use crate::summary::SummaryRecord;

/// Consumer of one tick's records.
///
/// A failing sink reports the error to the caller, which logs it and keeps
/// going with the other sinks and the next tick.
pub trait SummarySink {
    fn name(&self) -> &'static str;

    fn publish(&mut self, records: &[SummaryRecord]) -> Result<(), SinkError>;
}
