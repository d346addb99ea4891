//! Process-related modules: the provider interface, its implementations and
//! nickname classification.
//!
//! This module provides:
//! - `provider`: the `ProcessInfoProvider` / `ProcessHandle` traits
//! - `procfs`: live provider reading `/proc`
//! - `testdata`: scripted provider replaying a JSON file
//! - `classifier`: nickname rules

pub mod classifier;
pub mod procfs;
pub mod provider;
pub mod testdata;

// Re-export commonly used types
pub use classifier::{Classifier, Rule};
pub use procfs::{ProcfsHandle, ProcfsProvider, DEFAULT_PROC_ROOT};
pub use provider::{CpuPercentages, MemoryInfo, ProcessHandle, ProcessInfoProvider};
pub use testdata::{TestData, TestDataProvider, TestProcess, TestTick};
