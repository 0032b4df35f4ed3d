//! Liveness heartbeat written by the scheduler and read by the health probe.

use std::{fs, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub const HEARTBEAT_FILE: &str = "heartbeat.json";

const MIN_INTERVAL: Duration = Duration::from_secs(60);
const GRACE: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// RFC3339, UTC.
    pub last_cycle_at: String,
    pub interval_secs: u64,
}

impl Heartbeat {
    pub fn new(at: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            last_cycle_at: at.to_rfc3339(),
            interval_secs: interval.as_secs(),
        }
    }

    /// A heartbeat older than three intervals plus a grace period means the loop is stuck.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let Ok(at) = DateTime::parse_from_rfc3339(&self.last_cycle_at) else {
            return true;
        };
        let age = now
            .signed_duration_since(at.with_timezone(&Utc))
            .to_std()
            .unwrap_or_default();
        age > stale_after(Duration::from_secs(self.interval_secs))
    }
}

pub fn stale_after(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL).saturating_mul(3) + GRACE
}

pub fn write_heartbeat(dir: &Path, at: DateTime<Utc>, interval: Duration) -> Result<()> {
    let txt = serde_json::to_string(&Heartbeat::new(at, interval))?;
    let tmp = dir.join(format!("{HEARTBEAT_FILE}.tmp"));
    fs::write(&tmp, txt)?;
    fs::rename(&tmp, dir.join(HEARTBEAT_FILE))?;
    Ok(())
}

pub fn read_heartbeat(dir: &Path) -> Result<Option<Heartbeat>> {
    let path = dir.join(HEARTBEAT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&txt)?))
}

/// Findings of one health probe run. Any error means unhealthy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Missing config only warns (it may be injected later); a missing data dir or a
/// stale heartbeat fails the probe.
pub fn check(data_dir: &Path, missing_vars: &[&str], now: DateTime<Utc>) -> HealthReport {
    let mut report = HealthReport::default();

    if !missing_vars.is_empty() {
        report.warnings.push(format!(
            "missing environment variables: {}",
            missing_vars.join(", ")
        ));
    }

    if !data_dir.is_dir() {
        report
            .errors
            .push(format!("data dir {} is not a directory", data_dir.display()));
        return report;
    }

    match read_heartbeat(data_dir) {
        Ok(None) => report
            .warnings
            .push("no heartbeat yet (first cycle may still be running)".to_string()),
        Ok(Some(hb)) if hb.is_stale(now) => report.errors.push(format!(
            "heartbeat is stale (last cycle at {})",
            hb.last_cycle_at
        )),
        Ok(Some(_)) => {}
        Err(e) => report.errors.push(format!("unreadable heartbeat: {e}")),
    }

    report
}
