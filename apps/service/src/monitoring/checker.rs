use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use thiserror::Error;
use tokio::time::timeout;

use super::validation::parse_method;
use crate::config::ServiceConfig;

const PROBE_USER_AGENT: &str = "vigil-status-monitor/1.0";
const PROBE_ACCEPT: &str = "text/html,application/json,*/*";

/// Why a check produced no HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckFailure {
    #[error("Service timed out")]
    TimedOut,

    #[error("Service not found (DNS resolution failed)")]
    DnsResolution,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection reset")]
    ConnectionReset,

    #[error("Error: {0}")]
    Transport(String),

    /// The service definition itself cannot be probed
    #[error("{0}")]
    InvalidService(String),
}

/// Checker trait for the kinds of endpoint a service may be
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform one request against `service` and return the HTTP status code.
    ///
    /// Implementations must give up after `deadline`.
    async fn check(&self, service: &ServiceConfig, deadline: Duration) -> Result<u16, CheckFailure>;
}

/// HTTP/HTTPS checker. Redirects are never followed.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(PROBE_ACCEPT));
        headers.insert(USER_AGENT, HeaderValue::from_static(PROBE_USER_AGENT));

        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, service: &ServiceConfig, deadline: Duration) -> Result<u16, CheckFailure> {
        let method = parse_method(&service.method)
            .map_err(|e| CheckFailure::InvalidService(e.to_string()))?;

        let request = self.client.request(method, &service.url).timeout(deadline).send();

        let response = timeout(deadline, request)
            .await
            .map_err(|_| CheckFailure::TimedOut)?
            .map_err(classify_transport_error)?;

        Ok(response.status().as_u16())
    }
}

/// Map a reqwest failure onto the specific transport condition behind it
fn classify_transport_error(error: reqwest::Error) -> CheckFailure {
    if error.is_timeout() {
        return CheckFailure::TimedOut;
    }
    if error.is_builder() {
        return CheckFailure::InvalidService(error.to_string());
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionRefused => return CheckFailure::ConnectionRefused,
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    return CheckFailure::ConnectionReset;
                }
                io::ErrorKind::TimedOut => return CheckFailure::TimedOut,
                _ => {}
            }
        }
        if is_dns_failure(&cause.to_string()) {
            return CheckFailure::DnsResolution;
        }
        source = cause.source();
    }

    CheckFailure::Transport(error_chain(&error))
}

fn is_dns_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("dns error")
        || message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("no such host")
}

/// Render an error with all of its causes, e.g. `error sending request: connection closed`
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}
