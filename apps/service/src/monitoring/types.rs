use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;

/// Status code recorded when no HTTP response was received.
pub const NO_STATUS_CODE: u16 = 0;

/// Classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Reachable and answering as expected (or redirecting)
    Online,
    /// Unreachable: timeout, DNS, refused or reset connection
    Offline,
    /// Reachable but answering with an unexpected status code
    Error,
}

impl ProbeStatus {
    pub fn is_online(self) -> bool {
        matches!(self, ProbeStatus::Online)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Online => write!(f, "online"),
            ProbeStatus::Offline => write!(f, "offline"),
            ProbeStatus::Error => write!(f, "error"),
        }
    }
}

/// Outcome of checking one service at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    /// Name of the configured service
    pub service: String,

    /// URL that was probed
    pub url: String,

    /// When the probe started
    pub timestamp: DateTime<Utc>,

    /// Classified outcome
    pub status: ProbeStatus,

    /// HTTP status code, or [`NO_STATUS_CODE`] for transport failures
    pub status_code: u16,

    /// Wall time spent on the probe, measured on failure too
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,

    /// Short human-readable classification
    pub message: String,
}

impl ProbeRecord {
    /// Start a record for `service`, stamped with the current time.
    ///
    /// The record stays `offline` until one of the outcome methods is applied.
    pub fn started(service: &ServiceConfig) -> Self {
        Self {
            service: service.name.clone(),
            url: service.url.clone(),
            timestamp: Utc::now(),
            status: ProbeStatus::Offline,
            status_code: NO_STATUS_CODE,
            response_time_ms: 0,
            message: String::new(),
        }
    }

    /// Mark the probe as reachable
    pub fn online(mut self, status_code: u16, response_time_ms: u64, message: impl Into<String>) -> Self {
        self.status = ProbeStatus::Online;
        self.status_code = status_code;
        self.response_time_ms = response_time_ms;
        self.message = message.into();
        self
    }

    /// Mark the probe as unreachable
    pub fn offline(mut self, response_time_ms: u64, message: impl Into<String>) -> Self {
        self.status = ProbeStatus::Offline;
        self.status_code = NO_STATUS_CODE;
        self.response_time_ms = response_time_ms;
        self.message = message.into();
        self
    }

    /// Mark the probe as answered-but-wrong
    pub fn error(mut self, status_code: u16, response_time_ms: u64, message: impl Into<String>) -> Self {
        self.status = ProbeStatus::Error;
        self.status_code = status_code;
        self.response_time_ms = response_time_ms;
        self.message = message.into();
        self
    }

    /// Record standing in for a probe that could not run at all
    pub fn check_failed(service: &ServiceConfig, reason: impl std::fmt::Display) -> Self {
        Self::started(service).error(NO_STATUS_CODE, 0, format!("Check failed: {reason}"))
    }

    /// Backdate or forward-date the record. Only meant for building fixtures
    /// and for replaying records from elsewhere.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_uses_log_field_names() {
        let service = ServiceConfig::new("api", "https://api.example.com");
        let record = ProbeRecord::started(&service).online(200, 42, "Service is online");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["service"], "api");
        assert_eq!(json["status"], "online");
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["responseTime"], 42);
        assert!(json.get("response_time_ms").is_none());
    }

    #[test]
    fn test_check_failed_is_error() {
        let service = ServiceConfig::new("api", "https://api.example.com");
        let record = ProbeRecord::check_failed(&service, "task panicked");

        assert_eq!(record.status, ProbeStatus::Error);
        assert_eq!(record.status_code, NO_STATUS_CODE);
        assert_eq!(record.message, "Check failed: task panicked");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ProbeStatus::Online.to_string(), "online");
        assert_eq!(ProbeStatus::Offline.to_string(), "offline");
        assert_eq!(ProbeStatus::Error.to_string(), "error");
    }
}
