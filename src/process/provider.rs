//! Process info provider interface.
//!
//! The sampler never touches the OS directly. It asks a provider for the live
//! pid set and opens one handle per pid; the handle keeps whatever counters it
//! needs to turn cumulative CPU time into a percentage between two queries.

use crate::error::ProviderError;

/// CPU usage as percent of one core since the previous query on the handle.
///
/// Values above 100 are normal for processes running on several cores.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuPercentages {
    pub total: f64,
    pub user: f64,
    pub system: f64,
    pub iowait: f64,
}

/// Virtual and resident memory in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub vms_bytes: u64,
    pub rss_bytes: u64,
}

/// Per-process handle returned by [`ProcessInfoProvider::open`].
pub trait ProcessHandle {
    fn pid(&self) -> u32;

    /// Full command line, arguments joined by single spaces. Empty for kernel threads.
    fn cmdline(&self) -> Result<String, ProviderError>;

    /// Short process name (comm).
    fn name(&self) -> Result<String, ProviderError>;

    /// Real user id.
    fn uid(&self) -> Result<u32, ProviderError>;

    /// Parent pid.
    fn ppid(&self) -> Result<u32, ProviderError>;

    /// CPU usage since the last call on this handle. The first call reports
    /// the average since the process started.
    fn cpu_percentages(&mut self) -> Result<CpuPercentages, ProviderError>;

    fn num_threads(&self) -> Result<u32, ProviderError>;

    fn memory(&self) -> Result<MemoryInfo, ProviderError>;
}

/// Source of live processes.
pub trait ProcessInfoProvider {
    type Handle: ProcessHandle;

    /// Lists live pids. Callers treat an error as an empty process table.
    fn list_pids(&mut self) -> Result<Vec<u32>, ProviderError>;

    /// Lists live pids for a baseline reading taken before the first tick.
    /// The following `list_pids` must still report the first tick's table.
    fn baseline_pids(&mut self) -> Result<Vec<u32>, ProviderError> {
        self.list_pids()
    }

    fn open(&mut self, pid: u32) -> Result<Self::Handle, ProviderError>;
}
