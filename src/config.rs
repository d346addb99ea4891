//! Configuration management for nickstat-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use clap::ValueEnum;
use nickstat_exporter::process::{Classifier, DEFAULT_PROC_ROOT};
use nickstat_exporter::{ConfigError, LabelMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10040;
pub const DEFAULT_INTERVAL_SECONDS: u64 = 10;

/// Built-in nickname rules.
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    ("NOCMD", "^$"),
    ("SYSTEMD", "^(/usr)?/lib/systemd"),
    ("SBIN", "^(/usr)?/sbin"),
    ("BASH", "^-bash$"),
    ("MXOS", "^[^ ]*java .*/mxos/server/bin"),
    ("CASS", "^[^ ]*java .*service.CassandraDaemon"),
];

/// Nicknames folded into one row by default.
pub const DEFAULT_REDUCE: &[&str] = &["NOCMD", "SYSTEMD", "SBIN", "BASH"];

fn default_rules() -> BTreeMap<String, String> {
    DEFAULT_RULES
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Exporter configuration. Unset fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Sampling
    #[serde(alias = "interval")]
    pub interval_seconds: Option<u64>,
    #[serde(alias = "max-cmdline-len")]
    pub max_cmdline_len: Option<i64>,
    /// Nicknames whose processes are folded into one row
    pub reduce: Option<Vec<String>>,
    #[serde(alias = "label-mode")]
    pub label_mode: Option<LabelMode>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    /// Take a baseline CPU reading before the first tick
    #[serde(alias = "prime-on-start")]
    pub prime_on_start: Option<bool>,

    // Server configuration
    pub bind: Option<String>,
    pub port: Option<u16>,

    // Outputs
    #[serde(alias = "enable-text-output")]
    pub enable_text_output: Option<bool>,
    #[serde(alias = "enable-metrics-server")]
    pub enable_metrics_server: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    /// Path to JSON test data file (uses scripted data instead of /proc)
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,

    /// Nickname to regex. Kept last: TOML wants tables after plain values.
    pub rules: Option<BTreeMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: Some(DEFAULT_INTERVAL_SECONDS),
            max_cmdline_len: Some(0),
            reduce: Some(DEFAULT_REDUCE.iter().map(|s| s.to_string()).collect()),
            label_mode: Some(LabelMode::Slot),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            prime_on_start: Some(true),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            enable_text_output: Some(true),
            enable_metrics_server: Some(true),
            log_level: Some("info".into()),
            test_data_file: None,
            rules: Some(default_rules()),
        }
    }
}

impl Config {
    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS)
    }

    pub fn max_cmdline_len(&self) -> i64 {
        self.max_cmdline_len.unwrap_or(0)
    }

    pub fn label_mode(&self) -> LabelMode {
        self.label_mode.unwrap_or_default()
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn rules(&self) -> BTreeMap<String, String> {
        self.rules.clone().unwrap_or_else(default_rules)
    }

    pub fn reducible(&self) -> BTreeSet<String> {
        match &self.reduce {
            Some(list) => list.iter().cloned().collect(),
            None => DEFAULT_REDUCE.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Compiles the configured rules.
    pub fn classifier(&self) -> Result<Classifier, ConfigError> {
        Classifier::new(&self.rules())
    }

    /// Fills every unset field from `fallback`.
    pub(crate) fn or(self, fallback: Config) -> Config {
        Config {
            interval_seconds: self.interval_seconds.or(fallback.interval_seconds),
            max_cmdline_len: self.max_cmdline_len.or(fallback.max_cmdline_len),
            reduce: self.reduce.or(fallback.reduce),
            label_mode: self.label_mode.or(fallback.label_mode),
            proc_root: self.proc_root.or(fallback.proc_root),
            prime_on_start: self.prime_on_start.or(fallback.prime_on_start),
            bind: self.bind.or(fallback.bind),
            port: self.port.or(fallback.port),
            enable_text_output: self.enable_text_output.or(fallback.enable_text_output),
            enable_metrics_server: self.enable_metrics_server.or(fallback.enable_metrics_server),
            log_level: self.log_level.or(fallback.log_level),
            test_data_file: self.test_data_file.or(fallback.test_data_file),
            rules: self.rules.or(fallback.rules),
        }
    }

    /// Socket address the HTTP server binds to. A host name in `bind` is
    /// resolved and its first address used.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        let port = self.port.unwrap_or(DEFAULT_PORT);
        if let Ok(ip) = bind.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }
        let invalid = || ConfigError::InvalidListenAddress(format!("{bind}:{port}"));
        (bind, port)
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }
}

/// Parses `-s`: a JSON object mapping nickname to regex.
pub fn parse_rules_json(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    serde_json::from_str(raw).map_err(|source| ConfigError::InvalidJson {
        what: "rules",
        source,
    })
}

/// Parses `-a`: a JSON array of nicknames.
pub fn parse_reduce_json(raw: &str) -> Result<Vec<String>, ConfigError> {
    serde_json::from_str(raw).map_err(|source| ConfigError::InvalidJson {
        what: "reduce list",
        source,
    })
}

/// Splits `host:port` or `:port` into bind address and port.
/// An empty host means all interfaces. Host names are kept as given and
/// resolved by [`Config::listen_addr`].
pub fn parse_listen_address(raw: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidListenAddress(raw.to_string());
    let (host, port) = raw.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() {
        DEFAULT_BIND_ADDR.to_string()
    } else {
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(invalid());
        }
        host.to_string()
    };
    Ok((host, port))
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let interval = cfg.interval_seconds();
    if interval == 0 {
        return Err(ConfigError::InvalidInterval(interval).into());
    }

    let classifier = cfg.classifier()?;

    for nickname in cfg.reducible() {
        if classifier.pattern(&nickname).is_none() {
            warn!(
                "Reduce list names '{}' but no rule has that nickname; \
                 only processes whose short name is '{}' will be folded",
                nickname, nickname
            );
        }
    }

    if cfg.enable_metrics_server.unwrap_or(true) {
        cfg.listen_addr()?;
    }

    if let Some(path) = &cfg.test_data_file {
        if !path.exists() {
            return Err(format!("Test data file not found: {}", path.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(interval) = args.interval {
        config.interval_seconds = Some(interval);
    }
    if let Some(len) = args.max_cmdline_len {
        config.max_cmdline_len = Some(len);
    }
    if let Some(raw) = &args.rules {
        config.rules = Some(parse_rules_json(raw)?);
    }
    if let Some(raw) = &args.reduce {
        config.reduce = Some(parse_reduce_json(raw)?);
    }
    if let Some(raw) = &args.listen {
        let (bind, port) = parse_listen_address(raw)?;
        config.bind = Some(bind);
        config.port = Some(port);
    }
    if let Some(mode) = args.label_mode {
        config.label_mode = Some(mode.into());
    }
    if args.no_text {
        config.enable_text_output = Some(false);
    }
    if args.no_server {
        config.enable_metrics_server = Some(false);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }

    if let Some(level) = &args.log_level {
        config.log_level = level.to_possible_value().map(|v| v.get_name().to_string());
    }

    // Test data file: CLI wins if provided
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => {
            // Try default locations
            let defaults = [
                "/etc/nickstat/exporter.yaml",
                "/etc/nickstat/exporter.yml",
                "/etc/nickstat/exporter.json",
                "/etc/nickstat/exporter.toml",
                "./nickstat-exporter.yaml",
                "./nickstat-exporter.yml",
                "./nickstat-exporter.json",
                "./nickstat-exporter.toml",
            ];

            match defaults.iter().map(Path::new).find(|p| p.exists()) {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)?;
    let defaults = Config::default();

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            config
        }
        Some("toml") => {
            let config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            config
        }
        _ => {
            // Default to YAML
            let config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            config
        }
    };

    Ok(config.or(defaults))
}

/// Serializes configuration in the requested format.
pub fn render_config(config: &Config, format: &ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: &ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, format)?;
    println!("{output}");
    Ok(())
}
