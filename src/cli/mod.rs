//! CLI subcommands for the `thumbd` binary.
//!
//! These commands inspect configuration without starting the schedulers.
//!
//! ## Usage
//!
//! ```bash
//! thumbd config show   # Effective configuration as JSON
//! thumbd schedulers    # Scheduler names, default first
//! ```

pub mod config_cmd;

use crate::config::{self, BACKGROUND, FOREGROUND, THRESHOLD};

/// Names of the schedulers the daemon builds, with the configured default
/// moved to the front.
pub fn scheduler_names(default_scheduler: &str) -> Vec<&'static str> {
    let mut names = vec![FOREGROUND, BACKGROUND, THRESHOLD];
    if let Some(pos) = names.iter().position(|n| *n == default_scheduler) {
        let default = names.remove(pos);
        names.insert(0, default);
    }
    names
}

/// Print scheduler names to stdout, one per line.
pub fn run_schedulers() {
    let env = config::load();
    for name in scheduler_names(&env.default_scheduler) {
        println!("{name}");
    }
}
