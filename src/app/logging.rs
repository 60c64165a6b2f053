use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global tracing subscriber for hosts that want the pipeline to
/// own log setup. `RUST_LOG` wins over `default_filter`. Safe to call more
/// than once; later calls (or an already-installed subscriber) are no-ops.
pub fn init_logging(default_filter: &str) {
    let filter = env_filter(default_filter);
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init();
    });
}

/// Same as [`init_logging`] but emits structured JSON lines.
pub fn init_json_logging(default_filter: &str) {
    let filter = env_filter(default_filter);
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init();
    });
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}
