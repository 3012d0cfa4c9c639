use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base address of the controller, e.g. `http://192.168.1.203`.
    pub device_base_url: String,
    /// Per-request timeout. `None` leaves the HTTP stack default in place.
    pub request_timeout: Option<Duration>,
    /// Gap between the end of one sensor poll and the start of the next.
    pub poll_interval: Duration,
    /// Gap between RFID scan attempts.
    pub rfid_scan_interval: Duration,
    /// Upper bound on a single RFID scan. `None` scans until cancelled.
    pub rfid_scan_timeout: Option<Duration>,
    /// Where the login session is persisted.
    pub session_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            device_base_url: required("DEVICE_BASE_URL")?
                .trim_end_matches('/')
                .to_owned(),
            request_timeout: non_zero_secs(
                optional("REQUEST_TIMEOUT_SECS", "10")
                    .parse()
                    .context("REQUEST_TIMEOUT_SECS must be a non-negative integer")?,
            ),
            poll_interval: Duration::from_millis(
                optional("POLL_INTERVAL_MS", "2000")
                    .parse()
                    .context("POLL_INTERVAL_MS must be a positive integer")?,
            ),
            rfid_scan_interval: Duration::from_millis(
                optional("RFID_SCAN_INTERVAL_MS", "1000")
                    .parse()
                    .context("RFID_SCAN_INTERVAL_MS must be a positive integer")?,
            ),
            rfid_scan_timeout: non_zero_secs(
                optional("RFID_SCAN_TIMEOUT_SECS", "120")
                    .parse()
                    .context("RFID_SCAN_TIMEOUT_SECS must be a non-negative integer")?,
            ),
            session_file: session_file(),
        })
    }
}

/// Session location on its own, for commands that never reach the
/// controller and so must not require `DEVICE_BASE_URL`.
pub fn session_file() -> PathBuf {
    PathBuf::from(optional("SESSION_FILE", "session.json"))
}

/// `0` means "no limit".
fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
