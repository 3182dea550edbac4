use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, warn};

use super::cycle::CheckCycle;
use crate::config::Config;

/// Timing and supervision knobs for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Time between the starts of two cycles
    pub check_interval: Duration,
    /// Delay before the first cycle after (re)starting
    pub warmup: Duration,
    /// Consecutive failed cycles that trigger a self-restart
    pub max_consecutive_failures: u32,
    /// Pause between stopping the timer and restarting it
    pub cooldown: Duration,
    /// Stop for good after this many self-restarts
    pub max_restarts: Option<u32>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            warmup: Duration::from_secs(5),
            max_consecutive_failures: 5,
            cooldown: Duration::from_secs(10),
            max_restarts: None,
        }
    }
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            check_interval: config.check_interval(),
            warmup: config.warmup(),
            max_consecutive_failures: config.supervisor.max_consecutive_failures.max(1),
            cooldown: Duration::from_secs(config.supervisor.cooldown_secs),
            max_restarts: config.supervisor.max_restarts,
        }
    }
}

/// Supervisor state of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    CoolingDown,
    Restarting,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "stopped"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::CoolingDown => write!(f, "cooling-down"),
            SchedulerState::Restarting => write!(f, "restarting"),
        }
    }
}

/// Counters shared between the handle and the running loop
struct Supervision {
    state: watch::Sender<SchedulerState>,
    consecutive_failures: AtomicU32,
    restarts: AtomicU32,
    cycles: AtomicU64,
}

impl Supervision {
    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }
}

/// Health-check scheduler - runs check cycles on a fixed interval and
/// restarts itself after repeated cycle failures
pub struct HealthCheckScheduler {
    cycle: Arc<dyn CheckCycle>,
    settings: SchedulerSettings,
    supervision: Arc<Supervision>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthCheckScheduler {
    /// Create a stopped scheduler
    pub fn new(cycle: Arc<dyn CheckCycle>, settings: SchedulerSettings) -> Self {
        let (state, _) = watch::channel(SchedulerState::Stopped);
        Self {
            cycle,
            settings,
            supervision: Arc::new(Supervision {
                state,
                consecutive_failures: AtomicU32::new(0),
                restarts: AtomicU32::new(0),
                cycles: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start polling. A running loop is replaced, never duplicated.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.take() {
            previous.abort();
            debug!("Replaced running scheduler loop");
        }

        self.supervision.consecutive_failures.store(0, Ordering::SeqCst);
        self.supervision.set_state(SchedulerState::Running);
        *task = Some(tokio::spawn(supervise(
            Arc::clone(&self.cycle),
            self.settings.clone(),
            Arc::clone(&self.supervision),
        )));

        info!(
            interval_secs = self.settings.check_interval.as_secs(),
            warmup_secs = self.settings.warmup.as_secs(),
            "Monitoring started"
        );
    }

    /// Stop polling. Probes already in flight still finish and are stored.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
            info!("Monitoring stopped");
        }
        self.supervision.set_state(SchedulerState::Stopped);
    }

    pub fn state(&self) -> SchedulerState {
        *self.supervision.state.borrow()
    }

    /// Watch supervisor state transitions
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.supervision.state.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.supervision.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Self-restarts since creation
    pub fn restart_count(&self) -> u32 {
        self.supervision.restarts.load(Ordering::SeqCst)
    }

    /// Cycles that completed successfully since creation
    pub fn completed_cycles(&self) -> u64 {
        self.supervision.cycles.load(Ordering::SeqCst)
    }
}

impl Drop for HealthCheckScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

/// The scheduler loop. Owns the only timer; a restart replaces it in place.
async fn supervise(cycle: Arc<dyn CheckCycle>, settings: SchedulerSettings, supervision: Arc<Supervision>) {
    loop {
        run_until_failure_threshold(cycle.as_ref(), &settings, &supervision).await;

        warn!(
            failures = settings.max_consecutive_failures,
            "Too many consecutive monitoring errors, restarting monitoring"
        );
        supervision.set_state(SchedulerState::CoolingDown);
        sleep(settings.cooldown).await;

        let restarts = supervision.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        if settings.max_restarts.is_some_and(|max| restarts > max) {
            error!(restarts, "Scheduler exceeded its restart budget, giving up");
            supervision.set_state(SchedulerState::Stopped);
            return;
        }

        supervision.set_state(SchedulerState::Restarting);
        supervision.consecutive_failures.store(0, Ordering::SeqCst);
        info!(restarts, "Restarting monitoring");
        supervision.set_state(SchedulerState::Running);
    }
}

/// Tick and run cycles until the consecutive failure threshold is reached
async fn run_until_failure_threshold(cycle: &dyn CheckCycle, settings: &SchedulerSettings, supervision: &Supervision) {
    let mut timer = interval_at(Instant::now() + settings.warmup, settings.check_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        timer.tick().await;

        match cycle.run().await {
            Ok(report) => {
                supervision.consecutive_failures.store(0, Ordering::SeqCst);
                supervision.cycles.fetch_add(1, Ordering::SeqCst);
                debug!(records = report.records.len(), "Monitoring cycle completed");
            }
            Err(e) => {
                let failures = supervision.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    "Monitoring cycle failed ({}/{}): {:#}",
                    failures, settings.max_consecutive_failures, e
                );
                if failures >= settings.max_consecutive_failures {
                    return;
                }
            }
        }
    }
}
