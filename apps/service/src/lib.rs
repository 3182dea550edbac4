//! Vigil service health monitor.
//!
//! Probes the configured services on a fixed interval, keeps every outcome
//! in a line-delimited JSON log and answers status, history and uptime
//! queries over it.

pub mod config;
pub mod database;
pub mod monitoring;
pub mod orchestrator;
pub mod query;

pub use config::{Config, ConfigError, ServiceConfig};
pub use orchestrator::Orchestrator;
