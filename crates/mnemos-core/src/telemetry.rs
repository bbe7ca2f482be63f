//! Log output for the memory layer.
//!
//! Everything this workspace logs comes from two targets: `mnemos_core`
//! (the `memory.*` events from [`crate::obs`], pipeline and recall spans,
//! persistence warnings) and `mnemos_backend` (one span per knowledge-backend
//! request). [`init_tracing`] sets both
//! targets to the requested level and everything else to `warn`, so HTTP
//! client internals stay quiet. A `RUST_LOG` filter replaces this default
//! entirely. Output is human-readable by default and newline-delimited JSON
//! for log shippers, with the target on every line.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets that log at the requested level when `RUST_LOG` is unset.
const TARGETS: [&str; 2] = ["mnemos_core", "mnemos_backend"];

/// Default filter: memory-layer targets at `level`, everything else at `warn`.
fn default_directives(level: Level) -> String {
    let mut directives = String::from("warn");
    for target in TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber.
///
/// `json` switches to newline-delimited JSON output.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(true).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(true)).try_init().ok();
    }
}
