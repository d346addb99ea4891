//! Line-oriented text output.
//!
//! Every tick is written as one data line per record followed by a blank
//! line and the header for the next tick. The column order is consumed by
//! other tooling and must not change.

use std::io::Write;

use crate::error::SinkError;
use crate::sink::SummarySink;
use crate::summary::{LabelMode, SummaryRecord};

/// Column header, printed at start and after every tick.
pub const HEADER: &str =
    "#time hostname nickname name pid cpu usr sys iowait num_threads VmsKb RssKb cmdline";

/// Header of the per-process listing, which shows owner and parent
/// instead of the nickname.
pub const PROCESS_HEADER: &str =
    "#time hostname uid name pid ppid cpu usr sys iowait num_threads VmsKb RssKb cmdline";

/// First `limit` characters of `cmdline`; `limit <= 0` keeps it whole.
pub fn truncate_cmdline(cmdline: &str, limit: i64) -> &str {
    if limit <= 0 {
        return cmdline;
    }
    match cmdline.char_indices().nth(limit as usize) {
        Some((byte_idx, _)) => &cmdline[..byte_idx],
        None => cmdline,
    }
}

/// Formats a single data line.
pub fn format_line(record: &SummaryRecord, mode: LabelMode, max_cmdline_len: i64) -> String {
    let m = &record.metrics;
    format!(
        "{} {} {} {} {} {:.1} {:.0} {:.0} {:.0} {:.0} {:.0} {:.0} {}",
        record.timestamp,
        record.hostname,
        record.nickname,
        record.name,
        record.id(mode),
        m.cpu_total,
        m.cpu_user,
        m.cpu_sys,
        m.cpu_iowait,
        m.num_threads,
        m.vms_kb,
        m.rss_kb,
        truncate_cmdline(&record.cmdline, max_cmdline_len)
    )
}

/// Formats one line of the per-process listing.
pub fn format_process_line(record: &SummaryRecord, max_cmdline_len: i64) -> String {
    let m = &record.metrics;
    format!(
        "{} {} {} {} {} {} {:.1} {:.1} {:.1} {:.1} {:.0} {:.0} {:.0} {}",
        record.timestamp,
        record.hostname,
        record.uid,
        record.name,
        record.pid,
        record.ppid,
        m.cpu_total,
        m.cpu_user,
        m.cpu_sys,
        m.cpu_iowait,
        m.num_threads,
        m.vms_kb,
        m.rss_kb,
        truncate_cmdline(&record.cmdline, max_cmdline_len)
    )
}

/// Text sink over any writer (stdout in production).
pub struct TextSink<W: Write> {
    out: W,
    mode: LabelMode,
    max_cmdline_len: i64,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W, mode: LabelMode, max_cmdline_len: i64) -> Self {
        Self {
            out,
            mode,
            max_cmdline_len,
        }
    }

    /// Writes the header line that precedes the first tick.
    pub fn write_header(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "{HEADER}")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SummarySink for TextSink<W> {
    fn name(&self) -> &'static str {
        "text"
    }

    fn publish(&mut self, records: &[SummaryRecord]) -> Result<(), SinkError> {
        for record in records {
            writeln!(
                self.out,
                "{}",
                format_line(record, self.mode, self.max_cmdline_len)
            )?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "{HEADER}")?;
        self.out.flush()?;
        Ok(())
    }
}
