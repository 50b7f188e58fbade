use std::sync::Once;

use tracing_subscriber::EnvFilter;

static SUBSCRIBER_INIT: Once = Once::new();

/// Sandbox lifecycle at `info`; everything else (bollard, hyper) only at
/// `warn`, so an embedding service does not inherit Docker client chatter.
pub const DEFAULT_TRACING_FILTER: &str = "warn,docker_sandbox=info";

/// Filter used by [`init_tracing`]: `RUST_LOG` when it is set and parses,
/// otherwise [`DEFAULT_TRACING_FILTER`].
pub fn sandbox_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACING_FILTER))
}

/// Install the process-wide `tracing` subscriber used by embedders of the
/// sandbox library.
///
/// Poll and retry loops log at `debug`, so `RUST_LOG=docker_sandbox=debug`
/// shows every inspect and archive attempt. Targets are kept in the output
/// so lines from `docker_sandbox::collect` and `docker_sandbox::session`
/// can be told apart.
///
/// Only the first call installs a subscriber; later calls do nothing.
pub fn init_tracing() {
    SUBSCRIBER_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .with_env_filter(sandbox_env_filter())
            .try_init();
    });
}
