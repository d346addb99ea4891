//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("nickstat-exporter.yaml"),
    };

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# nickstat exporter configuration
# ===============================
#
# Sampling
# --------
# interval_seconds: 10         # Seconds between ticks (-i)
# max_cmdline_len: 0           # Truncate the cmdline column, 0 = unlimited (-l)
# label_mode: slot             # "slot" (stable small ids) or "pid" (raw pids)
# proc_root: /proc             # procfs mount point
# prime_on_start: true         # Baseline CPU reading before the first tick
# test_data_file: null         # Replay scripted ticks from JSON instead of /proc
#
# Nickname rules (-s)
# -------------------
# Regexes searched anywhere in the full command line. Rules are tried in
# name order and the last match wins; unmatched processes keep their short
# name. A rule may match the empty command line (kernel threads).
# rules:
#   NOCMD: "^$"
#   SBIN: "^(/usr)?/sbin"
#
# reduce (-a)
# -----------
# Nicknames whose processes are folded into a single row per tick.
# reduce: [NOCMD, SYSTEMD, SBIN, BASH]
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 10040                  # HTTP port (-u host:port or :port)
# enable_metrics_server: true  # Serve /metrics, /health and /
# enable_text_output: true     # Print text lines on stdout
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
