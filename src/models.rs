use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health status of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Unknown,
    Up,
    Down,
}

/// Latest outcome of one probe. One entry per service, overwritten in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub service_name: String,
    /// What was probed, for display: a URL, `host:port`, or bare hostname.
    pub target: String,
    pub status: Status,
    /// Probe duration in milliseconds. Only set when the probe succeeded.
    pub latency_ms: Option<f64>,
    /// `None` means the service has never been checked.
    pub checked_at: Option<DateTime<Utc>>,
    /// Raw diagnostic text, empty when healthy.
    pub error: String,
}

impl CheckResult {
    pub fn up(name: &str, target: String, latency: Duration) -> Self {
        Self {
            service_name: name.to_string(),
            target,
            status: Status::Up,
            latency_ms: Some(latency.as_secs_f64() * 1000.0),
            checked_at: Some(Utc::now()),
            error: String::new(),
        }
    }

    pub fn down(name: &str, target: String, error: String) -> Self {
        Self {
            service_name: name.to_string(),
            target,
            status: Status::Down,
            latency_ms: None,
            checked_at: Some(Utc::now()),
            error,
        }
    }
}
