//! nickstat-exporter sampling engine.
//!
//! The library samples the process table at a fixed interval, gives every
//! process a nickname from command-line rules, folds configured nicknames
//! into one row each, and keeps small stable slot numbers per nickname so
//! exported series survive process restarts.
//!
//! # Usage
//!
//! ```rust
//! use std::collections::{BTreeMap, BTreeSet};
//! use nickstat_exporter::process::{Classifier, TestDataProvider, TestProcess, TestTick};
//! use nickstat_exporter::sampler::Sampler;
//!
//! let mut rules = BTreeMap::new();
//! rules.insert("SBIN".to_string(), "^(/usr)?/sbin".to_string());
//! let classifier = Classifier::new(&rules).unwrap();
//!
//! let provider = TestDataProvider::from_ticks(vec![TestTick {
//!     processes: vec![
//!         TestProcess::new(812, "cron", "/usr/sbin/cron -f").with_threads(1),
//!         TestProcess::new(901, "sshd", "sshd: /usr/bin/sshd -D").with_threads(1),
//!     ],
//! }]);
//!
//! let reducible: BTreeSet<String> = ["SBIN".to_string()].into_iter().collect();
//! let mut sampler = Sampler::new(provider, classifier, reducible, "web01");
//! let tick = sampler.tick("2024-03-01T12:00:00");
//! assert_eq!(tick.records.len(), 2);
//! ```

pub mod aggregate;
pub mod error;
pub mod process;
pub mod registry;
pub mod sampler;
pub mod scheduler;
pub mod sink;
pub mod summary;
pub mod worker;

// Re-export main types for convenience
pub use error::{ConfigError, ProviderError, SinkError};
pub use registry::SlotRegistry;
pub use sampler::{PassStats, Sampler, Tick};
pub use summary::{EntityKey, LabelMode, ProcMetrics, SummaryRecord};
pub use worker::{TickStats, TickStatsSnapshot, Worker};
