//! Logging setup
//!
//! Reports go to stdout, so log events are written to stderr. `RUST_LOG`
//! applies when no `-v` flag is given.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    if verbosity == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(0)))
    } else {
        EnvFilter::new(level_for(verbosity))
    }
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if a global subscriber is already set
pub fn init_telemetry(verbosity: u8) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
