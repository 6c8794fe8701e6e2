use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CODEQA_LOG";
const DEFAULT_FILTER: &str = "codeqa=info";

/// Install the stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("codeqa=debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Run `f` and log how long it took.
pub fn timed<T>(label: &str, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let out = f();
    info!("{} took {:.3}s", label, started.elapsed().as_secs_f64());
    out
}
