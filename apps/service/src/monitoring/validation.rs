//! Startup validation of configured services.
//!
//! A service that fails here is a configuration error: the process refuses
//! to start rather than monitor something it cannot probe.

use anyhow::{Result, anyhow};
use reqwest::Method;
use url::Url;

use crate::config::ServiceConfig;

/// Validate a full service definition
pub fn validate_service(service: &ServiceConfig) -> Result<()> {
    if service.name.trim().is_empty() {
        return Err(anyhow!("Service name cannot be empty"));
    }

    validate_http_target(&service.url)?;
    parse_method(&service.method)?;
    validate_expected_status(service.expected_status)?;

    Ok(())
}

/// Validate HTTP/HTTPS target
pub fn validate_http_target(target: &str) -> Result<Url> {
    if target.trim().is_empty() {
        return Err(anyhow!("URL cannot be empty"));
    }

    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme for HTTP service: {}", other)),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL has no host: {}", target));
    }

    if url.port() == Some(0) {
        return Err(anyhow!("Port 0 is not valid"));
    }

    Ok(url)
}

/// Parse a configured method name, case-insensitively
pub fn parse_method(method: &str) -> Result<Method> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "HEAD" => Ok(Method::HEAD),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "OPTIONS" => Ok(Method::OPTIONS),
        "PATCH" => Ok(Method::PATCH),
        _ => Err(anyhow!("Unsupported HTTP method: {}", method)),
    }
}

fn validate_expected_status(status: u16) -> Result<()> {
    if !(100..=599).contains(&status) {
        return Err(anyhow!("Expected status {} is not an HTTP status code", status));
    }
    Ok(())
}

/// Validate check interval
pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    const MIN_INTERVAL: u64 = 1;
    const MAX_INTERVAL: u64 = 86400; // 24 hours

    if interval_seconds < MIN_INTERVAL {
        return Err(anyhow!(
            "Check interval too short: {} seconds (minimum: {})",
            interval_seconds,
            MIN_INTERVAL
        ));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(anyhow!(
            "Check interval too long: {} seconds (maximum: {})",
            interval_seconds,
            MAX_INTERVAL
        ));
    }

    Ok(())
}

/// Validate timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 1;
    const MAX_TIMEOUT: u64 = 300; // 5 minutes

    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}
