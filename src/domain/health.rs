//! Backend health classification

use std::time::Duration;

use serde::Serialize;

use super::cache::BackendMode;

const HEALTHY_BELOW: Duration = Duration::from_secs(1);
const DEGRADED_UP_TO: Duration = Duration::from_secs(5);

/// Health status derived from probe latency
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy under 1s, degraded up to 5s, unhealthy beyond
    pub fn from_latency(latency: Duration) -> Self {
        if latency < HEALTHY_BELOW {
            HealthStatus::Healthy
        } else if latency <= DEGRADED_UP_TO {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Point-in-time view of backend reachability
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub connected: bool,
    pub latency_ms: Option<u64>,
    pub status: HealthStatus,
    /// Millis since epoch
    pub last_check_timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<BackendMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthSnapshot {
    /// Snapshot from a successful probe
    pub fn probed(mode: BackendMode, latency: Duration, now_millis: u64) -> Self {
        Self {
            connected: true,
            latency_ms: Some(latency.as_millis() as u64),
            status: HealthStatus::from_latency(latency),
            last_check_timestamp: now_millis,
            mode: Some(mode),
            key_count: None,
            error: None,
        }
    }

    /// Snapshot for a missing connection or failed probe
    pub fn disconnected(now_millis: u64, error: Option<String>) -> Self {
        Self {
            connected: false,
            latency_ms: None,
            status: HealthStatus::Unhealthy,
            last_check_timestamp: now_millis,
            mode: None,
            key_count: None,
            error,
        }
    }

    pub fn with_key_count(mut self, key_count: usize) -> Self {
        self.key_count = Some(key_count);
        self
    }
}
