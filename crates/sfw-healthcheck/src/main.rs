//! Container health probe: exits 0 when the watcher looks alive, 1 otherwise.

use std::{path::Path, process::ExitCode};

use chrono::Utc;
use sfw_core::{config, health};

fn main() -> ExitCode {
    config::load_dotenv_if_present(Path::new(".env"));

    let data_dir = config::env_path("DATA_DIR").unwrap_or_else(|| config::DEFAULT_DATA_DIR.into());
    let report = health::check(&data_dir, &config::missing_required_vars(), Utc::now());

    for w in &report.warnings {
        println!("WARNING: {w}");
    }
    for e in &report.errors {
        println!("ERROR: {e}");
    }

    if report.is_healthy() {
        println!("OK");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
