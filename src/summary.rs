//! Summary records produced by one sampling pass.
//!
//! A record is one reporting row: either a single process or a reduced group
//! of processes sharing a nickname. Records are rebuilt every tick and handed
//! to the sinks by shared reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// Timestamp format used on every text line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Numeric fields of a record, summed when records are reduced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcMetrics {
    pub cpu_total: f64,
    pub cpu_user: f64,
    pub cpu_sys: f64,
    pub cpu_iowait: f64,
    pub num_threads: f64,
    pub vms_kb: f64,
    pub rss_kb: f64,
}

impl ProcMetrics {
    /// Metric names in export order.
    pub const NAMES: [&'static str; 7] = [
        "cpu_total",
        "cpu_user",
        "cpu_sys",
        "cpu_iowait",
        "num_threads",
        "vms_kb",
        "rss_kb",
    ];

    /// `(name, value)` pairs in export order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        Self::NAMES.into_iter().zip([
            self.cpu_total,
            self.cpu_user,
            self.cpu_sys,
            self.cpu_iowait,
            self.num_threads,
            self.vms_kb,
            self.rss_kb,
        ])
    }
}

impl AddAssign for ProcMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.cpu_total += rhs.cpu_total;
        self.cpu_user += rhs.cpu_user;
        self.cpu_sys += rhs.cpu_sys;
        self.cpu_iowait += rhs.cpu_iowait;
        self.num_threads += rhs.num_threads;
        self.vms_kb += rhs.vms_kb;
        self.rss_kb += rhs.rss_kb;
    }
}

/// Identity of the entity behind a record, used for slot assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Pid(u32),
    /// All processes of a reduced nickname, whatever their pids.
    Group,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Pid(pid) => write!(f, "{pid}"),
            EntityKey::Group => f.write_str("group"),
        }
    }
}

/// Which identifier goes into the `pid` column and the third metric label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// Raw process id.
    Pid,
    /// Stable slot within the nickname.
    #[default]
    Slot,
}

impl LabelMode {
    pub fn label_name(self) -> &'static str {
        match self {
            LabelMode::Pid => "pid",
            LabelMode::Slot => "slot",
        }
    }
}

/// One reporting row for a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub timestamp: String,
    pub hostname: String,
    pub nickname: String,
    /// Short process name.
    pub name: String,
    pub pid: u32,
    pub uid: u32,
    pub ppid: u32,
    pub key: EntityKey,
    /// Assigned by the slot registry after reduction.
    pub slot: u32,
    pub metrics: ProcMetrics,
    pub cmdline: String,
    /// Number of processes folded into this row.
    pub members: usize,
}

impl SummaryRecord {
    /// Identifier shown for this row under `mode`.
    pub fn id(&self, mode: LabelMode) -> u32 {
        match mode {
            LabelMode::Pid => self.pid,
            LabelMode::Slot => self.slot,
        }
    }

    /// Ordered label set for export.
    pub fn labels(&self, mode: LabelMode) -> [(&'static str, String); 3] {
        [
            ("hostname", self.hostname.clone()),
            ("nickname", self.nickname.clone()),
            (mode.label_name(), self.id(mode).to_string()),
        ]
    }

    /// True for a single process whose short name is already its nickname.
    pub fn is_self_named(&self) -> bool {
        self.name == self.nickname
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_add_assign() {
        let mut a = ProcMetrics {
            cpu_total: 1.5,
            num_threads: 2.0,
            rss_kb: 100.0,
            ..ProcMetrics::default()
        };
        a += ProcMetrics {
            cpu_total: 2.5,
            num_threads: 3.0,
            rss_kb: 50.0,
            ..ProcMetrics::default()
        };
        assert_eq!(a.cpu_total, 4.0);
        assert_eq!(a.num_threads, 5.0);
        assert_eq!(a.rss_kb, 150.0);
    }

    #[test]
    fn test_metrics_iter_order() {
        let m = ProcMetrics {
            cpu_total: 1.0,
            rss_kb: 7.0,
            ..ProcMetrics::default()
        };
        let pairs: Vec<_> = m.iter().collect();
        assert_eq!(pairs.len(), 7);
        assert_eq!(pairs[0], ("cpu_total", 1.0));
        assert_eq!(pairs[6], ("rss_kb", 7.0));
    }

    #[test]
    fn test_label_mode_parse() {
        let mode: LabelMode = serde_yaml::from_str("pid").expect("parses");
        assert_eq!(mode, LabelMode::Pid);
        assert_eq!(LabelMode::default().label_name(), "slot");
    }
}
