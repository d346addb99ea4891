//! nickstat-exporter
//!
//! Per-process CPU, thread and memory sampler with nickname grouping.
//! This is the main entry point that wires the pacemaker, the sampling
//! worker, the sinks and the HTTP server, and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use chrono::{DateTime, Local};
use clap::{Parser, ValueEnum};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal, sync::mpsc};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use nickstat_exporter::process::{ProcessInfoProvider, ProcfsProvider, TestDataProvider};
use nickstat_exporter::scheduler::{pacemaker, TickSchedule};
use nickstat_exporter::sink::{MetricsSink, TextSink};
use nickstat_exporter::{Sampler, TickStats, Worker};

use cli::{Args, Commands, LogLevel};
use commands::{command_config, command_ps, command_rules, command_test};
use config::{resolve_config, show_config, validate_effective_config, Config};
use handlers::{health_handler, metrics_handler, root_handler};
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
/// Logs go to stderr; stdout carries the text records.
fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = config
        .log_level
        .as_deref()
        .and_then(|s| LogLevel::from_str(s, true).ok())
        .unwrap_or(LogLevel::Info);

    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Host name for the `hostname` column and label.
fn resolve_hostname(proc_root: &Path) -> String {
    match nix::unistd::gethostname() {
        Ok(name) => {
            let name = name.to_string_lossy().trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
        Err(e) => debug!("gethostname failed: {}", e),
    }

    match std::fs::read_to_string(proc_root.join("sys/kernel/hostname")) {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            warn!("Could not determine hostname, using 'localhost'");
            "localhost".to_string()
        }
    }
}

/// Builds the worker for `provider` and starts it on its own thread.
fn spawn_worker<P>(
    provider: P,
    config: &Config,
    hostname: &str,
    metrics: &MetricsSink,
    ticks: mpsc::Receiver<DateTime<Local>>,
) -> Result<Arc<TickStats>, Box<dyn std::error::Error>>
where
    P: ProcessInfoProvider + Send + 'static,
    P::Handle: Send,
{
    let sampler = Sampler::new(provider, config.classifier()?, config.reducible(), hostname);
    let interval = Duration::from_secs(config.interval_seconds());
    let mut worker = Worker::new(sampler, interval).with_telemetry(metrics.telemetry().clone());

    if config.enable_text_output.unwrap_or(true) {
        let mut text = TextSink::new(io::stdout(), config.label_mode(), config.max_cmdline_len());
        text.write_header()?;
        worker = worker.with_sink(Box::new(text));
    }
    if config.enable_metrics_server.unwrap_or(true) {
        worker = worker.with_sink(Box::new(metrics.clone()));
    }

    let stats = worker.stats();
    let prime = config.prime_on_start.unwrap_or(true);
    std::thread::Builder::new()
        .name("sampler".into())
        .spawn(move || {
            if prime {
                worker.sampler_mut().prime();
            }
            worker.run(ticks);
        })?;

    Ok(stats)
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), format.clone(), *commented);
        }

        let config = load_validated_config(&args)?;
        setup_logging(&config)?;

        return match command {
            Commands::Rules { verbose, classify } => {
                command_rules(*verbose, classify.clone(), &config)
            }
            Commands::Test {
                iterations,
                verbose,
            } => {
                let hostname = resolve_hostname(&config.proc_root());
                command_test(*iterations, *verbose, &config, &hostname)
            }
            Commands::Ps { delay } => {
                let hostname = resolve_hostname(&config.proc_root());
                command_ps(Duration::from_secs(*delay), &config, &hostname)
            }
            Commands::Config { .. } => unreachable!("Config handled above"),
        };
    }

    // Load configuration for main mode
    let config = load_validated_config(&args)?;
    setup_logging(&config)?;

    info!(
        "Starting nickstat-exporter {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_BUILD_TIMESTAMP")
    );

    if config.test_data_file.is_none() {
        if let Err(e) = startup_checks::validate_requirements(&config.proc_root()) {
            error!("❌ Startup validation failed: {}", e);
            error!("   The exporter will start but may not function correctly!");
        }
    }

    let hostname = resolve_hostname(&config.proc_root());
    let metrics = MetricsSink::new(config.label_mode())?;
    let interval = Duration::from_secs(config.interval_seconds());
    info!(
        "Sampling every {}s as host '{}' with {} rules, label mode '{}'",
        config.interval_seconds(),
        hostname,
        config.rules().len(),
        config.label_mode().label_name()
    );

    // Capacity one: the pacemaker runs at most one tick ahead of the worker.
    let (tx, rx) = mpsc::channel(1);
    let tick_stats = match &config.test_data_file {
        Some(path) => {
            info!("Using test data from {}", path.display());
            spawn_worker(TestDataProvider::from_file(path)?, &config, &hostname, &metrics, rx)?
        }
        None => spawn_worker(
            ProcfsProvider::new(config.proc_root()),
            &config,
            &hostname,
            &metrics,
            rx,
        )?,
    };
    tokio::spawn(pacemaker(tx, TickSchedule::starting_now(interval)));

    if !config.enable_metrics_server.unwrap_or(true) {
        info!("HTTP server disabled");
        shutdown_signal().await;
        info!("nickstat-exporter stopped gracefully");
        return Ok(());
    }

    let addr = config.listen_addr()?;
    let state = Arc::new(AppState::new(metrics, tick_stats, config, hostname));

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!("nickstat-exporter listening on http://{}", addr);

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    info!("nickstat-exporter stopped gracefully");
    Ok(())
}
