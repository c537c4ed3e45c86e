//! thumbd entry point.
//!
//! ## CLI Subcommands
//!
//! - `thumbd` or `thumbd serve` - Run the scheduling daemon (default)
//! - `thumbd config show` - Print effective configuration as JSON
//! - `thumbd config validate` - Check configuration (exit 0/1)
//! - `thumbd schedulers` - List scheduler names, default first

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thumbd_core::cache::MemoryCache;
use thumbd_core::config;
use thumbd_core::scheduler::EventReceiver;
use thumbd_core::telemetry::init_logging;
use thumbd_core::{Daemon, DaemonConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => match serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Server error: {}", e);
                ExitCode::FAILURE
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => ExitCode::from(thumbd_core::cli::config_cmd::run_show() as u8),
                "validate" => ExitCode::from(thumbd_core::cli::config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "schedulers" => {
            thumbd_core::cli::run_schedulers();
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("thumbd {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "thumbd - thumbnail request scheduler v{}

USAGE:
    thumbd [COMMAND]

COMMANDS:
    serve            Run the daemon (default when no command given)
    config show      Print effective configuration as JSON
    config validate  Check configuration and overrides file
    schedulers       List scheduler names, default first
    version          Show version information
    help             Show this help message

ENVIRONMENT:
    THUMBD_LIFO_THREADS       Foreground pool threads (0 = one per processor)
    THUMBD_THRESHOLD          Max elements routed to the small pool (default: 20)
    THUMBD_THRESHOLD_THREADS  Threads per threshold pool (default: 2)
    THUMBD_WORKER_TIMEOUT     Seconds per worker invocation (default: 60)
    THUMBD_DEFAULT_SCHEDULER  foreground | background | threshold
    THUMBD_LOG_LEVEL          Log filter (default: info)
    THUMBD_LOG_FORMAT         json | pretty
    THUMBD_LOG_FILE           Append logs to this file instead of stderr
    THUMBD_OVERRIDES          Preferred-worker overrides file (TOML)",
        version
    );
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let env = config::load();
    init_logging(&env.log)?;

    let (daemon, events) = Daemon::new(DaemonConfig::from(&env), Arc::new(MemoryCache::new()))?;

    if let Some(path) = &env.overrides_path {
        let overrides = config::load_overrides(path)?;
        tracing::info!(path = %path.display(), entries = overrides.preferred.len(), "loaded overrides");
        daemon.registry().apply_preferred(overrides.into_preferred());
    }

    let drain = tokio::spawn(log_events(events));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    daemon.shutdown();
    drop(daemon);

    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        tracing::warn!("event stream still open after shutdown");
    }
    tracing::info!("thumbd stopped");
    Ok(())
}

/// Stand-in for the transport layer: log every event until all senders drop.
async fn log_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::debug!(event = %json, "scheduler event"),
            Err(e) => tracing::warn!(error = %e, "unserializable event"),
        }
    }
}
