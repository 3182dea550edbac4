//! Shared tracing setup for the vigil binaries.

mod subscriber;

pub use subscriber::{init as init_tracing, init_with_level};
pub use tracing::level_filters::LevelFilter;
