//! Logging bootstrap and in-process counters.
//!
//! Grounded on the teacher's `tracing`/`tracing-subscriber`/`tracing-appender`
//! dependency trio (declared in `Cargo.toml` but wired up at the
//! application's entry point rather than inside the library, the same
//! placement used here) and on `telemetry::metrics::PipelineMetrics`'s
//! atomic-counter design, adapted from tile-pipeline counters to
//! engine-lifecycle counters.

mod metrics;

pub use metrics::EngineMetrics;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber with an env-filter-driven
/// stderr layer, plus an optional rolling file layer when `log_dir` is
/// given. The returned `WorkerGuard` must be held for the file layer's
/// background writer to keep flushing; dropping it stops logging to disk.
pub fn init_logging(log_level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "geotrack.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
