use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "POMOSYNC_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Keeps stdout free for a line protocol.
    Stderr,
}

/// `RUST_LOG` wins, then `POMOSYNC_LOG_LEVEL`, then `info`. Returns false when a global
/// subscriber was already installed.
pub fn init_tracing(target: LogTarget) -> bool {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match target {
        LogTarget::Stdout => builder.try_init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.is_ok()
}
