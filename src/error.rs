//! Error types shared by the sampling engine and its adapters.

use std::io;

/// Failure of a single provider query.
///
/// These are never fatal: the sampler decides per process whether a failure
/// means the process is gone or just raced with its start.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("field {0} missing")]
    MissingField(&'static str),

    #[error("test data: {0}")]
    TestData(String),
}

impl ProviderError {
    pub fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        ProviderError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

/// Startup configuration problems. All of them abort the program.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rule '{name}' has an invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{0}' has an empty pattern")]
    EmptyPattern(String),

    #[error("interval must be a positive number of seconds, got {0}")]
    InvalidInterval(u64),

    #[error("invalid JSON for {what}: {source}")]
    InvalidJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),
}

/// A sink could not render or expose a tick.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metric set lock poisoned")]
    Poisoned,
}
