//! CLI arguments and subcommands for nickstat-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands. The short flags `-i`, `-l`,
//! `-s`, `-a` and `-u` keep the names existing deployments use.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use nickstat_exporter::LabelMode;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Identifier exported in the third label / pid column
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LabelModeArg {
    Pid,
    Slot,
}

impl From<LabelModeArg> for LabelMode {
    fn from(arg: LabelModeArg) -> Self {
        match arg {
            LabelModeArg::Pid => LabelMode::Pid,
            LabelModeArg::Slot => LabelMode::Slot,
        }
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "nickstat-exporter",
    about = "Per-process CPU/thread/memory sampler grouped by cmdline nicknames",
    long_about = "Per-process CPU/thread/memory sampler grouped by cmdline nicknames.\n\n\
                  Samples the process table every interval, assigns each process a nickname \
                  from regular-expression rules on its command line, folds configured nicknames \
                  into a single row and publishes the rows as text lines on stdout and as \
                  Prometheus gauges on /metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Sampling interval in seconds
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Max length of the cmdline column (0 = unlimited)
    #[arg(short = 'l', long)]
    pub max_cmdline_len: Option<i64>,

    /// Nickname rules as a JSON object {"NICK": "regex", ...}
    #[arg(short = 's', long)]
    pub rules: Option<String>,

    /// Nicknames to aggregate as a JSON array ["NICK", ...]
    #[arg(short = 'a', long)]
    pub reduce: Option<String>,

    /// Listen address for /metrics (host:port or :port; host names are resolved)
    #[arg(short = 'u', long)]
    pub listen: Option<String>,

    /// Identifier used in the pid column and metric labels
    #[arg(long, value_enum)]
    pub label_mode: Option<LabelModeArg>,

    /// Do not print text lines on stdout
    #[arg(long)]
    pub no_text: bool,

    /// Do not start the HTTP server
    #[arg(long)]
    pub no_server: bool,

    /// procfs mount point
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Path to JSON test data file (replays scripted ticks instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Log level (default: info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run sampling passes back to back and print them
    Test {
        /// Number of passes
        #[arg(short = 'n', long, default_value_t = 2)]
        iterations: usize,

        /// Show per-pass statistics
        #[arg(long)]
        verbose: bool,
    },

    /// List every process once with uid and ppid, before grouping
    Ps {
        /// Seconds between the baseline reading and the listing
        #[arg(short = 'd', long, default_value_t = 1)]
        delay: u64,
    },

    /// List nickname rules in evaluation order
    Rules {
        /// Show reducible flag and aggregate pattern for each rule
        #[arg(long)]
        verbose: bool,

        /// Classify this command line and print the nickname
        #[arg(long)]
        classify: Option<String>,
    },
}
