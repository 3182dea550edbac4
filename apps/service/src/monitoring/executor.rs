use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use super::checker::{CheckFailure, Checker, HttpChecker};
use super::types::ProbeRecord;
use crate::config::ServiceConfig;

/// A service definition that cannot be probed at all
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("service '{0}' has no URL")]
    MissingUrl(String),

    #[error("service '{service}' is malformed: {reason}")]
    Malformed { service: String, reason: String },
}

/// Probe executor - runs one bounded check and classifies it
pub struct ProbeExecutor {
    checker: Arc<dyn Checker>,
}

impl ProbeExecutor {
    /// Create an executor backed by the HTTP checker
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self::with_checker(Arc::new(HttpChecker::new()?)))
    }

    pub fn with_checker(checker: Arc<dyn Checker>) -> Self {
        Self { checker }
    }

    /// Probe `service` once.
    ///
    /// Network conditions never surface as errors; they are folded into the
    /// returned record. Only a service without a usable URL or method is
    /// reported as [`ProbeError`].
    pub async fn probe(&self, service: &ServiceConfig, timeout: Duration) -> Result<ProbeRecord, ProbeError> {
        if service.url.trim().is_empty() {
            return Err(ProbeError::MissingUrl(service.name.clone()));
        }

        let record = ProbeRecord::started(service);
        let start = Instant::now();
        let outcome = self.checker.check(service, timeout).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let record = match outcome {
            Ok(code) if (300..400).contains(&code) => {
                record.online(code, elapsed, format!("Service is online (redirected with {code})"))
            }
            Ok(code) if code == service.expected_status => record.online(code, elapsed, "Service is online"),
            Ok(code) => {
                record.error(code, elapsed, format!("Service returned unexpected status code: {code}"))
            }
            Err(CheckFailure::InvalidService(reason)) => {
                return Err(ProbeError::Malformed { service: service.name.clone(), reason });
            }
            Err(failure) => record.offline(elapsed, failure.to_string()),
        };

        debug!(
            service = %record.service,
            status = %record.status,
            latency_ms = record.response_time_ms,
            "Checked {}: {}",
            record.service,
            record.message
        );

        Ok(record)
    }
}
