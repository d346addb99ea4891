//! Ps command implementation.
//!
//! Prints every process once, before grouping, with its owner and parent.

use chrono::Local;
use std::io::{self, Write};
use std::time::Duration;

use nickstat_exporter::process::{ProcessInfoProvider, ProcfsProvider, TestDataProvider};
use nickstat_exporter::sink::{format_process_line, PROCESS_HEADER};
use nickstat_exporter::summary::TIMESTAMP_FORMAT;
use nickstat_exporter::Sampler;

use crate::config::Config;

/// Lists processes with the provider the configuration selects.
pub fn command_ps(
    delay: Duration,
    config: &Config,
    hostname: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let out = io::stdout().lock();
    match &config.test_data_file {
        Some(path) => {
            let provider = TestDataProvider::from_file(path)?;
            list_processes(provider, out, delay, config, hostname)
        }
        None => list_processes(
            ProcfsProvider::new(config.proc_root()),
            out,
            delay,
            config,
            hostname,
        ),
    }
}

/// Takes a baseline, waits `delay` so CPU covers that window, then writes
/// one line per process in pid order.
fn list_processes<P: ProcessInfoProvider, W: Write>(
    provider: P,
    mut out: W,
    delay: Duration,
    config: &Config,
    hostname: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sampler = Sampler::new(provider, config.classifier()?, config.reducible(), hostname);
    sampler.prime();
    std::thread::sleep(delay);

    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let (records, stats) = sampler.sample(&timestamp);

    writeln!(out, "{PROCESS_HEADER}")?;
    for record in &records {
        writeln!(out, "{}", format_process_line(record, config.max_cmdline_len()))?;
    }
    out.flush()?;

    if stats.vanished + stats.skipped > 0 {
        eprintln!(
            "⚠️  {} processes exited or could not be read",
            stats.vanished + stats.skipped
        );
    }
    Ok(())
}
