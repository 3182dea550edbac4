use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber at `info`, honouring `RUST_LOG`.
pub fn init() {
    initialize_tracing(LevelFilter::INFO);
}

/// Install the global subscriber with a different default level.
///
/// `RUST_LOG` still wins over `level` when it is set.
pub fn init_with_level(level: LevelFilter) {
    initialize_tracing(level);
}

/// Build the subscriber; `RUST_LOG_FORMAT=json` switches to structured output.
fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_target(false).with_filter(env_filter).boxed(),
    };

    if let Err(error) = tracing_subscriber::registry().with(log_layer).try_init() {
        warn!("Tracing subscriber already installed: {error}");
    }
}
