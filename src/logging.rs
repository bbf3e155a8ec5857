use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LOG_DIR;

/// Initializes structured logging for a job binary: stdout plus a per-job
/// rolling file under `LOG_DIR/<job_name>.log`, matching the one-file-per-job
/// convention. Returns the file-appender guard, which must be kept alive for
/// the lifetime of the process.
pub fn init(job_name: &str) -> tracing_appender::non_blocking::WorkerGuard {
    std::fs::create_dir_all(LOG_DIR.as_str()).ok();
    let file_appender = tracing_appender::rolling::never(LOG_DIR.as_str(), format!("{job_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
