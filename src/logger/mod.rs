//! Tracing subscriber setup.
//!
//! Filter directives come from `FLEETCAST_LOG` (default `info`). Output goes
//! to stderr so command results on stdout stay machine-readable.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding `EnvFilter` directives.
pub const LOG_ENV: &str = "FLEETCAST_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Filter from [`LOG_ENV`], or `info` when it is unset or unparsable.
#[must_use]
pub fn env_filter() -> EnvFilter {
    build_filter(std::env::var(LOG_ENV).ok().as_deref())
}

fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(json: bool) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
