use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the watcher.
///
/// `RUST_LOG` wins when set; otherwise `level` (the `LOG_LEVEL` config value) applies to
/// our crates and everything else stays at `warn`.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let level = normalize_level(level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,sfw={level},sfw_core={level},sfw_smule={level},sfw_telegram={level},{service_name}={level}"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to init logging: {e}")))
}

/// Map Python-style level names (`WARNING`, `CRITICAL`) onto tracing levels.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        _ => "info",
    }
}
