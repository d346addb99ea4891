//! Linux `/proc` implementation of the process info provider.
//!
//! CPU percentages are computed from `utime`, `stime` and
//! `delayacct_blkio_ticks` in `/proc/<pid>/stat`, memory comes from
//! `/proc/<pid>/statm`. The root directory is configurable so tests can point
//! the provider at a fabricated tree.

use once_cell::sync::Lazy;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

use crate::error::ProviderError;
use crate::process::provider::{CpuPercentages, MemoryInfo, ProcessHandle, ProcessInfoProvider};

pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

fn get_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64;
            }
        }
    }
    4096
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Memory page size in bytes (for statm conversion).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Fields of `/proc/<pid>/stat` the provider cares about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatFields {
    pub ppid: u32,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub num_threads: u32,
    pub start_ticks: u64,
    pub blkio_ticks: u64,
}

/// Parses the content of `/proc/<pid>/stat`.
///
/// The comm field may contain spaces and parentheses, so parsing starts after
/// the last `)`.
pub fn parse_stat(content: &str) -> Result<StatFields, ProviderError> {
    let close = content
        .rfind(')')
        .ok_or_else(|| ProviderError::parse("stat", "missing ')' after comm"))?;
    // Index 0 is field 3 (state) of proc(5).
    let parts: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if parts.len() <= 19 {
        return Err(ProviderError::parse(
            "stat",
            format!("expected at least 22 fields, got {}", parts.len() + 2),
        ));
    }

    let field = |idx: usize, what: &'static str| -> Result<u64, ProviderError> {
        parts[idx]
            .parse::<u64>()
            .map_err(|e| ProviderError::parse(what, e.to_string()))
    };

    Ok(StatFields {
        ppid: field(1, "ppid")? as u32,
        utime_ticks: field(11, "utime")?,
        stime_ticks: field(12, "stime")?,
        num_threads: field(17, "num_threads")? as u32,
        start_ticks: field(19, "starttime")?,
        // Field 42; absent on old kernels.
        blkio_ticks: parts.get(39).and_then(|v| v.parse().ok()).unwrap_or(0),
    })
}

/// Parses `/proc/<pid>/statm` into bytes.
pub fn parse_statm(content: &str, page_size: u64) -> Result<MemoryInfo, ProviderError> {
    let mut it = content.split_whitespace();
    let mut next = |what: &'static str| -> Result<u64, ProviderError> {
        it.next()
            .ok_or(ProviderError::MissingField(what))?
            .parse::<u64>()
            .map_err(|e| ProviderError::parse(what, e.to_string()))
    };
    let size = next("statm size")?;
    let resident = next("statm resident")?;
    Ok(MemoryInfo {
        vms_bytes: size * page_size,
        rss_bytes: resident * page_size,
    })
}

/// Extracts the real uid from `/proc/<pid>/status`.
pub fn parse_status_uid(content: &str) -> Result<u32, ProviderError> {
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("Uid:") {
            return v
                .split_whitespace()
                .next()
                .ok_or(ProviderError::MissingField("Uid"))?
                .parse()
                .map_err(|e: std::num::ParseIntError| ProviderError::parse("Uid", e.to_string()));
        }
    }
    Err(ProviderError::MissingField("Uid"))
}

/// Turns the NUL separated `/proc/<pid>/cmdline` into a space separated string.
pub fn join_cmdline(raw: &[u8]) -> String {
    raw.split(|&b| b == 0u8)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_uptime(root: &Path) -> Result<f64, ProviderError> {
    let content = fs::read_to_string(root.join("uptime"))?;
    content
        .split_whitespace()
        .next()
        .ok_or(ProviderError::MissingField("uptime"))?
        .parse()
        .map_err(|e: std::num::ParseFloatError| ProviderError::parse("uptime", e.to_string()))
}

/// Cumulative CPU seconds at one point in time.
#[derive(Debug, Clone, Copy)]
struct CpuSample {
    at: Instant,
    user: f64,
    system: f64,
    iowait: f64,
}

/// Provider backed by a procfs mount.
pub struct ProcfsProvider {
    root: PathBuf,
}

impl ProcfsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcfsProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcessInfoProvider for ProcfsProvider {
    type Handle = ProcfsHandle;

    /// Scans the root directory for entries with numeric names.
    fn list_pids(&mut self) -> Result<Vec<u32>, ProviderError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)?.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(pid) = name.parse::<u32>() {
                out.push(pid);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    fn open(&mut self, pid: u32) -> Result<ProcfsHandle, ProviderError> {
        let proc_path = self.root.join(pid.to_string());
        if !proc_path.is_dir() {
            return Err(ProviderError::NotFound(pid));
        }
        Ok(ProcfsHandle {
            pid,
            root: self.root.clone(),
            proc_path,
            last: None,
        })
    }
}

/// Handle on one `/proc/<pid>` directory.
pub struct ProcfsHandle {
    pid: u32,
    root: PathBuf,
    proc_path: PathBuf,
    last: Option<CpuSample>,
}

impl ProcfsHandle {
    fn read_stat(&self) -> Result<StatFields, ProviderError> {
        let content = fs::read_to_string(self.proc_path.join("stat"))?;
        parse_stat(&content)
    }
}

impl ProcessHandle for ProcfsHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn cmdline(&self) -> Result<String, ProviderError> {
        let raw = fs::read(self.proc_path.join("cmdline"))?;
        Ok(join_cmdline(&raw))
    }

    fn name(&self) -> Result<String, ProviderError> {
        let comm = fs::read_to_string(self.proc_path.join("comm"))?;
        Ok(comm.trim_end_matches('\n').to_string())
    }

    fn uid(&self) -> Result<u32, ProviderError> {
        let status = fs::read_to_string(self.proc_path.join("status"))?;
        parse_status_uid(&status)
    }

    fn ppid(&self) -> Result<u32, ProviderError> {
        Ok(self.read_stat()?.ppid)
    }

    fn cpu_percentages(&mut self) -> Result<CpuPercentages, ProviderError> {
        let stat = self.read_stat()?;
        let now = Instant::now();
        let tck = *CLK_TCK;
        let sample = CpuSample {
            at: now,
            user: stat.utime_ticks as f64 / tck,
            system: stat.stime_ticks as f64 / tck,
            iowait: stat.blkio_ticks as f64 / tck,
        };

        let (elapsed, user, system, iowait) = match self.last {
            Some(prev) => (
                now.duration_since(prev.at).as_secs_f64(),
                sample.user - prev.user,
                sample.system - prev.system,
                sample.iowait - prev.iowait,
            ),
            None => {
                // First query: average over the lifetime of the process.
                let uptime = read_uptime(&self.root)?;
                let lifetime = uptime - stat.start_ticks as f64 / tck;
                (lifetime, sample.user, sample.system, sample.iowait)
            }
        };
        self.last = Some(sample);

        if elapsed <= 0.0 {
            debug!("pid {}: zero elapsed time, reporting idle CPU", self.pid);
            return Ok(CpuPercentages::default());
        }

        let pct = |secs: f64| (secs.max(0.0) / elapsed) * 100.0;
        Ok(CpuPercentages {
            total: pct(user + system),
            user: pct(user),
            system: pct(system),
            iowait: pct(iowait),
        })
    }

    fn num_threads(&self) -> Result<u32, ProviderError> {
        Ok(self.read_stat()?.num_threads)
    }

    fn memory(&self) -> Result<MemoryInfo, ProviderError> {
        let content = fs::read_to_string(self.proc_path.join("statm"))?;
        parse_statm(&content, *PAGE_SIZE)
    }
}
