pub mod checker;
/// Monitoring engine module - probes services and schedules check cycles
///
/// This module is responsible for:
/// - Executing bounded HTTP/HTTPS checks
/// - Classifying each outcome into a probe record
/// - Running supervised check cycles on a timer
pub mod cycle;
pub mod executor;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use cycle::{CheckCycle, CycleReport, ProbeCycle};
pub use executor::{ProbeError, ProbeExecutor};
pub use scheduler::{HealthCheckScheduler, SchedulerSettings, SchedulerState};
pub use types::{ProbeRecord, ProbeStatus};
