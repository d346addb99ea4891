//! Scripted process provider backed by a JSON file.
//!
//! Each entry of `ticks` is the process table seen by one sampling pass.
//! `list_pids` advances to the next tick; once the script is exhausted the
//! last tick repeats. A baseline reading positions the script on its first
//! tick without consuming it. Ticks listed in `failed_listings` make
//! enumeration itself fail. Handles opened earlier read the tick that is current at
//! query time, so a pid missing from a later tick behaves like an exited
//! process and a name listed in `fail` behaves like a failed query.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::process::provider::{CpuPercentages, MemoryInfo, ProcessHandle, ProcessInfoProvider};

/// One scripted process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestProcess {
    pub pid: u32,
    #[serde(default)]
    pub cmdline: String,
    pub name: String,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub ppid: u32,
    #[serde(default)]
    pub cpu_total: f64,
    #[serde(default)]
    pub cpu_user: f64,
    #[serde(default)]
    pub cpu_system: f64,
    #[serde(default)]
    pub cpu_iowait: f64,
    #[serde(default)]
    pub num_threads: u32,
    #[serde(default)]
    pub vms_bytes: u64,
    #[serde(default)]
    pub rss_bytes: u64,
    /// Queries that fail for this process in this tick
    /// (`cmdline`, `name`, `uid`, `ppid`, `cpu`, `threads`, `memory`).
    #[serde(default)]
    pub fail: Vec<String>,
}

impl TestProcess {
    /// Process with the given identity and no load.
    pub fn new(pid: u32, name: &str, cmdline: &str) -> Self {
        Self {
            pid,
            name: name.to_string(),
            cmdline: cmdline.to_string(),
            ..Self::default()
        }
    }

    pub fn with_cpu(mut self, total: f64, user: f64, system: f64, iowait: f64) -> Self {
        self.cpu_total = total;
        self.cpu_user = user;
        self.cpu_system = system;
        self.cpu_iowait = iowait;
        self
    }

    pub fn with_threads(mut self, n: u32) -> Self {
        self.num_threads = n;
        self
    }

    pub fn with_memory(mut self, vms_bytes: u64, rss_bytes: u64) -> Self {
        self.vms_bytes = vms_bytes;
        self.rss_bytes = rss_bytes;
        self
    }

    pub fn failing(mut self, field: &str) -> Self {
        self.fail.push(field.to_string());
        self
    }
}

/// The process table of one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestTick {
    pub processes: Vec<TestProcess>,
}

/// Root structure for the test data JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestData {
    #[serde(default)]
    pub version: String,
    pub ticks: Vec<TestTick>,
    /// Indices of ticks whose pid enumeration fails.
    #[serde(default)]
    pub failed_listings: Vec<usize>,
}

/// Load test data from a JSON file.
pub fn load_test_data_from_file(path: &Path) -> anyhow::Result<TestData> {
    use anyhow::Context;

    debug!("Loading test data from: {}", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test data file {}", path.display()))?;
    let data: TestData =
        serde_json::from_str(&content).context("Failed to parse test data JSON")?;
    info!(
        "Loaded test data version {} with {} ticks",
        data.version,
        data.ticks.len()
    );
    Ok(data)
}

/// Provider replaying a [`TestData`] script.
pub struct TestDataProvider {
    data: Arc<TestData>,
    // usize::MAX until the first list_pids call.
    cursor: Arc<AtomicUsize>,
    // Set by baseline_pids: the next list_pids stays on the current tick.
    hold: bool,
}

impl TestDataProvider {
    pub fn new(data: TestData) -> Self {
        Self {
            data: Arc::new(data),
            cursor: Arc::new(AtomicUsize::new(usize::MAX)),
            hold: false,
        }
    }

    pub fn from_ticks(ticks: Vec<TestTick>) -> Self {
        Self::new(TestData {
            version: "inline".to_string(),
            ticks,
            failed_listings: Vec::new(),
        })
    }

    /// Makes enumeration fail on the tick with index `tick`.
    pub fn with_failed_listing(mut self, tick: usize) -> Self {
        Arc::make_mut(&mut self.data).failed_listings.push(tick);
        self
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(load_test_data_from_file(path)?))
    }

    /// Moves to the next tick and lists its pids.
    fn advance(&mut self) -> Result<Vec<u32>, ProviderError> {
        if self.data.ticks.is_empty() {
            return Err(ProviderError::TestData("script has no ticks".to_string()));
        }
        let last = self.data.ticks.len() - 1;
        let next = match self.cursor.load(Ordering::Relaxed) {
            usize::MAX => 0,
            idx => (idx + 1).min(last),
        };
        self.cursor.store(next, Ordering::Relaxed);
        self.pids_at(next)
    }

    fn pids_at(&self, idx: usize) -> Result<Vec<u32>, ProviderError> {
        if self.data.failed_listings.contains(&idx) {
            return Err(ProviderError::TestData(format!(
                "scripted enumeration failure at tick {idx}"
            )));
        }
        let tick = self
            .data
            .ticks
            .get(idx)
            .ok_or_else(|| ProviderError::TestData("script has no ticks".to_string()))?;
        Ok(tick.processes.iter().map(|p| p.pid).collect())
    }

    fn lookup(&self, pid: u32) -> Option<&TestProcess> {
        current_tick(&self.data, &self.cursor)?
            .processes
            .iter()
            .find(|p| p.pid == pid)
    }
}

fn current_tick<'a>(data: &'a TestData, cursor: &AtomicUsize) -> Option<&'a TestTick> {
    let idx = cursor.load(Ordering::Relaxed);
    if idx == usize::MAX {
        return None;
    }
    data.ticks.get(idx)
}

impl ProcessInfoProvider for TestDataProvider {
    type Handle = TestDataHandle;

    fn list_pids(&mut self) -> Result<Vec<u32>, ProviderError> {
        if std::mem::take(&mut self.hold) {
            return self.pids_at(self.cursor.load(Ordering::Relaxed));
        }
        self.advance()
    }

    fn baseline_pids(&mut self) -> Result<Vec<u32>, ProviderError> {
        let pids = self.advance();
        self.hold = true;
        pids
    }

    fn open(&mut self, pid: u32) -> Result<TestDataHandle, ProviderError> {
        if self.lookup(pid).is_none() {
            return Err(ProviderError::NotFound(pid));
        }
        Ok(TestDataHandle {
            pid,
            data: Arc::clone(&self.data),
            cursor: Arc::clone(&self.cursor),
        })
    }
}

/// Handle on a scripted process.
pub struct TestDataHandle {
    pid: u32,
    data: Arc<TestData>,
    cursor: Arc<AtomicUsize>,
}

impl TestDataHandle {
    fn query<T>(
        &self,
        field: &'static str,
        f: impl FnOnce(&TestProcess) -> T,
    ) -> Result<T, ProviderError> {
        let proc = current_tick(&self.data, &self.cursor)
            .and_then(|tick| tick.processes.iter().find(|p| p.pid == self.pid))
            .ok_or(ProviderError::NotFound(self.pid))?;
        if proc.fail.iter().any(|name| name == field) {
            return Err(ProviderError::TestData(format!(
                "scripted failure of {} for pid {}",
                field, self.pid
            )));
        }
        Ok(f(proc))
    }
}

impl ProcessHandle for TestDataHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn cmdline(&self) -> Result<String, ProviderError> {
        self.query("cmdline", |p| p.cmdline.clone())
    }

    fn name(&self) -> Result<String, ProviderError> {
        self.query("name", |p| p.name.clone())
    }

    fn uid(&self) -> Result<u32, ProviderError> {
        self.query("uid", |p| p.uid)
    }

    fn ppid(&self) -> Result<u32, ProviderError> {
        self.query("ppid", |p| p.ppid)
    }

    fn cpu_percentages(&mut self) -> Result<CpuPercentages, ProviderError> {
        self.query("cpu", |p| CpuPercentages {
            total: p.cpu_total,
            user: p.cpu_user,
            system: p.cpu_system,
            iowait: p.cpu_iowait,
        })
    }

    fn num_threads(&self) -> Result<u32, ProviderError> {
        self.query("threads", |p| p.num_threads)
    }

    fn memory(&self) -> Result<MemoryInfo, ProviderError> {
        self.query("memory", |p| MemoryInfo {
            vms_bytes: p.vms_bytes,
            rss_bytes: p.rss_bytes,
        })
    }
}
