//! Config CLI subcommands: show, validate.
//!
//! These commands read configuration directly from environment variables
//! without starting the daemon.

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as JSON to stdout.
pub fn run_show() -> i32 {
    let cfg = config::load().effective_config();
    match render(&cfg) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {e}");
            1
        }
    }
}

/// Validate configuration and the overrides file.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load());
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn render(cfg: &EffectiveConfig) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(cfg)
}

fn validate(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&env.log.level) {
        warnings.push(format!("THUMBD_LOG_LEVEL ({}) is not a valid filter: {e}", env.log.level));
    }
    if let Some(path) = &env.overrides_path {
        if let Err(e) = config::load_overrides(path) {
            warnings.push(e.to_string());
        }
    }
    warnings
}
