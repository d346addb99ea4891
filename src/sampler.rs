//! Sampling pass: one summary record per live process per tick.
//!
//! The sampler keeps two generations of provider handles keyed by pid. A
//! handle found in the previous generation belongs to a known process and
//! carries the counters needed for CPU deltas; any failed query on it means
//! the process is gone. A freshly opened handle may fail individual queries
//! because it raced with process start or exit; those fields stay at their
//! defaults for this tick.

use ahash::AHashMap as HashMap;
use std::collections::BTreeSet;
use std::mem;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::reduce;
use crate::error::ProviderError;
use crate::process::{Classifier, ProcessHandle, ProcessInfoProvider};
use crate::registry::SlotRegistry;
use crate::summary::{EntityKey, ProcMetrics, SummaryRecord};

/// Kibibytes per byte count.
const UNIT_MEM: u64 = 1024;

/// Counters describing one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Pids returned by the provider.
    pub scanned: usize,
    /// Known processes dropped because a query failed.
    pub vanished: usize,
    /// Pids skipped because they could not be opened or read at all.
    pub skipped: usize,
    /// Records emitted after reduction.
    pub records: usize,
}

/// Result of one tick.
#[derive(Debug, Clone, Default)]
pub struct Tick {
    pub records: Vec<SummaryRecord>,
    pub stats: PassStats,
}

/// Outcome of querying one handle.
enum Sampled {
    Record(Box<SummaryRecord>),
    /// Known process whose query failed.
    Vanished,
    /// New process for which nothing could be read.
    Unreadable,
}

/// Drives the provider, classifier, reduction and slot registry.
pub struct Sampler<P: ProcessInfoProvider> {
    provider: P,
    classifier: Classifier,
    reducible: BTreeSet<String>,
    hostname: String,
    previous: HashMap<u32, P::Handle>,
    current: HashMap<u32, P::Handle>,
    registry: SlotRegistry,
}

impl<P: ProcessInfoProvider> Sampler<P> {
    pub fn new(
        provider: P,
        classifier: Classifier,
        reducible: BTreeSet<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            classifier,
            reducible,
            hostname: hostname.into(),
            previous: HashMap::new(),
            current: HashMap::new(),
            registry: SlotRegistry::new(),
        }
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    /// Number of processes carried into the next pass.
    pub fn tracked(&self) -> usize {
        self.previous.len()
    }

    /// Opens a handle for every live process and takes a baseline CPU
    /// reading, so the first tick reports usage over one interval instead of
    /// since process start.
    pub fn prime(&mut self) {
        let pids = match self.provider.baseline_pids() {
            Ok(pids) => pids,
            Err(e) => {
                warn!("Process enumeration failed, skipping baseline: {}", e);
                Vec::new()
            }
        };
        for pid in pids {
            if let Ok(mut handle) = self.provider.open(pid) {
                if handle.cpu_percentages().is_ok() {
                    self.previous.insert(pid, handle);
                }
            }
        }
        info!("Primed {} process handles", self.previous.len());
    }

    fn list_pids(&mut self) -> Vec<u32> {
        match self.provider.list_pids() {
            Ok(pids) => pids,
            Err(e) => {
                warn!("Process enumeration failed, treating tick as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Runs one full pass: sample, reduce, reconcile slots, roll state.
    #[instrument(skip(self))]
    pub fn tick(&mut self, timestamp: &str) -> Tick {
        let (records, mut stats) = self.sample(timestamp);
        let mut records = reduce(records, &self.reducible, &self.classifier);
        self.registry.reconcile(&mut records);
        stats.records = records.len();
        debug!(
            "Tick {}: {} scanned, {} vanished, {} skipped, {} records",
            timestamp, stats.scanned, stats.vanished, stats.skipped, stats.records
        );
        Tick { records, stats }
    }

    /// Builds one record per live process and rolls the handle generations.
    ///
    /// Records are returned in ascending pid order.
    pub fn sample(&mut self, timestamp: &str) -> (Vec<SummaryRecord>, PassStats) {
        let mut pids = self.list_pids();
        pids.sort_unstable();
        pids.dedup();

        let mut stats = PassStats {
            scanned: pids.len(),
            ..PassStats::default()
        };
        let mut records = Vec::with_capacity(pids.len());

        for pid in pids {
            let (mut handle, known) = match self.previous.remove(&pid) {
                Some(h) => (h, true),
                None => match self.provider.open(pid) {
                    Ok(h) => (h, false),
                    Err(e) => {
                        debug!("Skipping pid {}: open failed: {}", pid, e);
                        stats.skipped += 1;
                        continue;
                    }
                },
            };

            match self.sample_one(&mut handle, known, timestamp) {
                Sampled::Record(record) => {
                    self.current.insert(pid, handle);
                    records.push(*record);
                }
                Sampled::Vanished => stats.vanished += 1,
                Sampled::Unreadable => stats.skipped += 1,
            }
        }

        // Whatever is left in `previous` was not listed this tick.
        self.previous.clear();
        mem::swap(&mut self.previous, &mut self.current);

        (records, stats)
    }

    fn sample_one(&self, handle: &mut P::Handle, known: bool, timestamp: &str) -> Sampled {
        let pid = handle.pid();
        let mut failures = 0usize;

        // Known process: first failure ends tracking. New process: default and go on.
        macro_rules! field {
            ($what:literal, $query:expr) => {
                match $query {
                    Ok(v) => v,
                    Err(e) => {
                        let e: ProviderError = e;
                        if known {
                            debug!("pid {} vanished ({} failed: {})", pid, $what, e);
                            return Sampled::Vanished;
                        }
                        debug!("pid {}: {} unavailable on first sight: {}", pid, $what, e);
                        failures += 1;
                        Default::default()
                    }
                }
            };
        }

        let cmdline: String = field!("cmdline", handle.cmdline());
        let name: String = field!("name", handle.name());
        let cpu = field!("cpu", handle.cpu_percentages());
        let num_threads: u32 = field!("threads", handle.num_threads());
        let mem = field!("memory", handle.memory());

        if failures == 5 {
            return Sampled::Unreadable;
        }

        // Informational only; never a reason to drop a process.
        let uid = handle.uid().unwrap_or_default();
        let ppid = handle.ppid().unwrap_or_default();

        let nickname = self.classifier.classify(&cmdline, &name);

        Sampled::Record(Box::new(SummaryRecord {
            timestamp: timestamp.to_string(),
            hostname: self.hostname.clone(),
            nickname,
            name,
            pid,
            uid,
            ppid,
            key: EntityKey::Pid(pid),
            slot: 0,
            metrics: ProcMetrics {
                cpu_total: cpu.total,
                cpu_user: cpu.user,
                cpu_sys: cpu.system,
                cpu_iowait: cpu.iowait,
                num_threads: num_threads as f64,
                vms_kb: (mem.vms_bytes / UNIT_MEM) as f64,
                rss_kb: (mem.rss_bytes / UNIT_MEM) as f64,
            },
            cmdline,
            members: 1,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{TestDataProvider, TestProcess, TestTick};
    use std::collections::BTreeMap;

    fn sampler(ticks: Vec<TestTick>, reduce: &[&str]) -> Sampler<TestDataProvider> {
        let mut rules = BTreeMap::new();
        rules.insert("SBIN".to_string(), "^(/usr)?/sbin".to_string());
        Sampler::new(
            TestDataProvider::from_ticks(ticks),
            Classifier::new(&rules).expect("rules compile"),
            reduce.iter().map(|s| s.to_string()).collect(),
            "testhost",
        )
    }

    fn tick_of(procs: Vec<TestProcess>) -> TestTick {
        TestTick { processes: procs }
    }

    #[test]
    fn test_sample_converts_memory_to_kib() {
        let mut s = sampler(
            vec![tick_of(vec![TestProcess::new(7, "cron", "/usr/sbin/cron")
                .with_memory(10 * 1024 * 1024 + 512, 2048)
                .with_threads(3)])],
            &[],
        );
        let (records, stats) = s.sample("ts");
        assert_eq!(stats.scanned, 1);
        assert_eq!(records[0].metrics.vms_kb, 10240.0);
        assert_eq!(records[0].metrics.rss_kb, 2.0);
        assert_eq!(records[0].metrics.num_threads, 3.0);
        assert_eq!(records[0].nickname, "SBIN");
        assert_eq!(records[0].hostname, "testhost");
        assert_eq!(s.tracked(), 1);
    }

    #[test]
    fn test_known_process_failure_drops_it() {
        let mut s = sampler(
            vec![
                tick_of(vec![TestProcess::new(7, "cron", "/usr/sbin/cron")]),
                tick_of(vec![TestProcess::new(7, "cron", "/usr/sbin/cron").failing("threads")]),
            ],
            &[],
        );
        s.sample("t0");
        let (records, stats) = s.sample("t1");
        assert!(records.is_empty());
        assert_eq!(stats.vanished, 1);
        assert_eq!(s.tracked(), 0);
    }

    #[test]
    fn test_new_process_failure_is_tolerated() {
        let mut s = sampler(
            vec![tick_of(vec![TestProcess::new(9, "app", "/opt/app")
                .with_threads(4)
                .failing("memory")])],
            &[],
        );
        let (records, stats) = s.sample("t0");
        assert_eq!(records.len(), 1);
        assert_eq!(stats.vanished, 0);
        assert_eq!(records[0].metrics.rss_kb, 0.0);
        assert_eq!(records[0].metrics.num_threads, 4.0);
        assert_eq!(s.tracked(), 1);
    }

    #[test]
    fn test_new_process_with_nothing_readable_is_skipped() {
        let mut s = sampler(
            vec![tick_of(vec![TestProcess::new(9, "app", "/opt/app")
                .failing("cmdline")
                .failing("name")
                .failing("cpu")
                .failing("threads")
                .failing("memory")])],
            &[],
        );
        let (records, stats) = s.sample("t0");
        assert!(records.is_empty());
        assert_eq!(stats.skipped, 1);
        assert_eq!(s.tracked(), 0);
    }

    #[test]
    fn test_records_sorted_by_pid() {
        let mut s = sampler(
            vec![tick_of(vec![
                TestProcess::new(30, "c", "c"),
                TestProcess::new(10, "a", "a"),
                TestProcess::new(20, "b", "b"),
            ])],
            &[],
        );
        let (records, _) = s.sample("t0");
        let pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![10, 20, 30]);
    }

    #[test]
    fn test_prime_carries_handles() {
        let mut s = sampler(
            vec![
                tick_of(vec![TestProcess::new(7, "cron", "/usr/sbin/cron")]),
                tick_of(vec![TestProcess::new(7, "cron", "/usr/sbin/cron").failing("cpu")]),
            ],
            &[],
        );
        s.prime();
        assert_eq!(s.tracked(), 1);
        let (records, _) = s.sample("t0");
        assert_eq!(records.len(), 1);
        // The handle is known now, so a failure on the next tick drops it.
        let (records, stats) = s.sample("t1");
        assert!(records.is_empty());
        assert_eq!(stats.vanished, 1);
    }

    #[test]
    fn test_prime_reports_first_scripted_tick() {
        let mut s = sampler(
            vec![
                tick_of(vec![TestProcess::new(1, "first", "/opt/first")]),
                tick_of(vec![TestProcess::new(2, "second", "/opt/second")]),
            ],
            &[],
        );
        s.prime();
        let names = |tick: Tick| -> Vec<String> { tick.records.into_iter().map(|r| r.name).collect() };
        assert_eq!(names(s.tick("t0")), vec!["first"]);
        assert_eq!(names(s.tick("t1")), vec!["second"]);
    }

    #[test]
    fn test_failed_enumeration_gives_empty_tick_and_releases_slots() {
        let app = |pid: u32| TestProcess::new(pid, "app", "/opt/app");
        let provider = TestDataProvider::from_ticks(vec![
            tick_of(vec![app(10), app(11)]),
            tick_of(vec![app(10), app(11)]),
            tick_of(vec![app(10), app(12)]),
        ])
        .with_failed_listing(1);
        let mut s = Sampler::new(
            provider,
            Classifier::new(&BTreeMap::new()).expect("no rules"),
            BTreeSet::new(),
            "testhost",
        );

        let first = s.tick("t0");
        assert_eq!(first.records.len(), 2);
        assert!(!s.registry().is_empty());

        let failed = s.tick("t1");
        assert!(failed.records.is_empty());
        assert_eq!(failed.stats.scanned, 0);
        assert!(s.registry().is_empty());
        assert_eq!(s.tracked(), 0);

        let recovered = s.tick("t2");
        let slots: Vec<(u32, u32)> = recovered.records.iter().map(|r| (r.pid, r.slot)).collect();
        assert_eq!(slots, vec![(10, 0), (12, 1)]);
    }

    #[test]
    fn test_tick_reduces_and_assigns_slots() {
        let mut s = sampler(
            vec![tick_of(vec![
                TestProcess::new(1, "sshd", "sshd: /usr/bin/sshd -D"),
                TestProcess::new(2, "cron", "/usr/sbin/cron").with_cpu(1.0, 1.0, 0.0, 0.0),
                TestProcess::new(3, "rsyslogd", "/usr/sbin/rsyslogd").with_cpu(2.0, 1.0, 1.0, 0.0),
            ])],
            &["SBIN"],
        );
        let tick = s.tick("t0");
        assert_eq!(tick.records.len(), 2);
        assert_eq!(tick.stats.records, 2);
        let sbin = tick
            .records
            .iter()
            .find(|r| r.nickname == "SBIN")
            .expect("SBIN row");
        assert_eq!(sbin.metrics.cpu_total, 3.0);
        assert_eq!(sbin.slot, 0);
        assert_eq!(s.registry().slot_for("SBIN", EntityKey::Group), Some(0));
    }
}
