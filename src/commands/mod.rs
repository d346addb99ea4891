//! CLI command implementations for nickstat-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `config`: Configuration file generation
//! - `ps`: One-shot per-process listing before grouping
//! - `rules`: Nickname rule listing and ad-hoc classification
//! - `test`: Sampling passes printed to stdout

pub mod config;
pub mod ps;
pub mod rules;

// Re-export command functions
pub use config::command_config;
pub use ps::command_ps;
pub use rules::command_rules;
pub use test::command_test;
